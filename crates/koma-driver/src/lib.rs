//! 驱动层模块
//!
//! 本模块提供屋顶电机控制器的链路驱动，包括：
//! - IO 线程管理（RX / TX 双线程，各自独占字节流的一半）
//! - 状态同步（功率 / 日志环形缓冲区，状态行 ArcSwap 无锁读取）
//! - ROOF 状态变化事件
//! - 链路指标与健康检查
//!
//! # 使用场景
//!
//! 需要直接发送电机命令、读取遥测的场景。
//! 屋顶的多用户仲裁见 `koma-roof`。

mod builder;
mod error;
mod link;
pub mod metrics;
pub mod pipeline;
pub mod ring;
pub mod state;

#[cfg(feature = "serial")]
pub use builder::DEFAULT_BAUD_RATE;
pub use builder::{LinkTarget, MotorLinkBuilder};
pub use error::DriverError;
pub use link::{LinkHealth, MotorLink};
pub use metrics::{LinkMetrics, LinkMetricsSnapshot};
pub use pipeline::{LinkConfig, rx_loop, tx_loop};
pub use ring::{LOG_HISTORY_LEN, POWER_HISTORY_LEN, RingBuffer};
pub use state::{LinkContext, MotorStatus};
