pub mod artifact;
pub mod instance;
pub mod process;

pub use artifact::*;
pub use instance::*;
pub use process::*;
