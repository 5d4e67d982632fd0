pub mod pm2;
pub mod process_manager;

pub use pm2::Pm2Adapter;
pub use process_manager::{pid_alive, ProcessManager};

#[cfg(test)]
pub use process_manager::MockProcessManager;
