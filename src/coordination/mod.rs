pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownToken};
