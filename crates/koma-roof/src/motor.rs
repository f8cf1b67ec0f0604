//! 仲裁器驱动的物理执行器

use koma_driver::{DriverError, MotorLink};
use std::sync::Arc;

/// 屋顶电机
///
/// 命令只负责下发，不等待确认；确认通过 ROOF 状态事件到达。
pub trait RoofMotor: Send + Sync {
    fn open(&self) -> Result<(), DriverError>;
    fn close(&self) -> Result<(), DriverError>;
}

impl RoofMotor for MotorLink {
    fn open(&self) -> Result<(), DriverError> {
        MotorLink::open(self)
    }

    fn close(&self) -> Result<(), DriverError> {
        MotorLink::close(self)
    }
}

impl<T: RoofMotor + ?Sized> RoofMotor for Arc<T> {
    fn open(&self) -> Result<(), DriverError> {
        (**self).open()
    }

    fn close(&self) -> Result<(), DriverError> {
        (**self).close()
    }
}
