//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use koma_sdk::prelude::*;
//! ```

pub use crate::service::RoofService;

// 驱动层
pub use koma_driver::{LinkConfig, LinkHealth, MotorLink, MotorLinkBuilder, MotorStatus};

// 仲裁层
pub use koma_roof::{
    FileStore, MemoryStore, RoofArbiter, RoofMotor, RoofPhase, RoofState, RoofStore, RoofView,
};

// 协议层
pub use koma_protocol::RoofStatus;

// 错误类型
pub use koma_driver::DriverError;
pub use koma_link::LinkError;
pub use koma_protocol::ProtocolError;
pub use koma_roof::{RoofError, StoreError};
