pub mod config;
pub mod controller;
pub mod hooks;

pub use config::*;
pub use controller::*;
pub use hooks::*;
