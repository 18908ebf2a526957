pub mod gate;
pub mod probe;

pub use gate::*;
pub use probe::*;
