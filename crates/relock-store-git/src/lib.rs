pub mod fs;
pub mod git;

pub use fs::*;
pub use git::*;
