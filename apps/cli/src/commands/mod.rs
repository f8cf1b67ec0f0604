//! 命令定义和实现

pub mod config;
pub mod motor;
pub mod state;

pub use config::ConfigCommand;
pub use motor::MotorCommand;
pub use state::StateCommand;
