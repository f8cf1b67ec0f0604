//! Koma SDK - 天文台滑顶控制 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): `$payload*CK\r\n` 帧编解码与消息分类
//! - **传输层** (`link`): 字节流抽象，TCP 串口服务器 / 本地串口
//! - **驱动层** (`driver`): IO 线程、遥测快照、ROOF 事件
//! - **仲裁层** (`roof`): 多用户开关顶仲裁，持久化记录
//!
//! # 快速开始
//!
//! ```no_run
//! use koma_sdk::prelude::*;
//!
//! koma_sdk::init_logger();
//! let link = MotorLinkBuilder::new().tcp("192.168.1.50:4001").build()?;
//! let service = RoofService::start(link, FileStore::new("/var/lib/koma"))?;
//!
//! service.request_open("alice")?;
//! println!("{}", service.phase()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use koma_driver as driver;
pub use koma_link as link;
pub use koma_protocol as protocol;
pub use koma_roof as roof;

mod logging;
pub mod prelude;
mod service;

pub use logging::init_logger;
pub use service::{LinkArbiter, RoofService};

// 常用类型
pub use koma_driver::{DriverError, LinkConfig, MotorLink, MotorLinkBuilder, MotorStatus};
pub use koma_link::LinkError;
pub use koma_protocol::{OutboundCommand, ProtocolError, RoofStatus};
pub use koma_roof::{RoofArbiter, RoofError, RoofPhase, RoofState, RoofView, StoreError};
