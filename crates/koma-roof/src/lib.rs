//! # Koma Roof
//!
//! 多用户屋顶仲裁：多个用户各自请求开顶 / 关顶，共用同一台电机。
//!
//! - 屋顶只要还有一个用户需要就保持打开，最后一个用户离开才关顶
//! - 仲裁记录 [`RoofState`] 保存在外部键值存储中，是唯一的事实来源，进程重启后继续生效
//! - 物理命令只下发不等待，确认通过电机上报的 ROOF 状态异步到达
//!
//! ## 示例
//!
//! ```
//! use koma_roof::{MemoryStore, RoofArbiter, RoofMotor};
//! use koma_driver::DriverError;
//!
//! struct NoopMotor;
//! impl RoofMotor for NoopMotor {
//!     fn open(&self) -> Result<(), DriverError> { Ok(()) }
//!     fn close(&self) -> Result<(), DriverError> { Ok(()) }
//! }
//!
//! let arbiter = RoofArbiter::new(MemoryStore::new(), NoopMotor);
//! let state = arbiter.request_open("alice").unwrap();
//! assert!(state.opening);
//! ```

mod arbiter;
mod error;
mod motor;
pub mod state;
pub mod store;
pub mod transition;

pub use arbiter::{DEFAULT_ROOF_KEY, RoofArbiter};
pub use error::{RoofError, StoreError};
pub use motor::RoofMotor;
pub use state::{RoofPhase, RoofState, RoofView};
pub use store::{FileStore, MemoryStore, RoofStore};
pub use transition::MotorMove;
