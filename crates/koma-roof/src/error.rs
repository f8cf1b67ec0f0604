//! 仲裁层错误类型定义

use koma_driver::DriverError;
use thiserror::Error;

/// 存储后端错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// 仲裁操作错误
///
/// 任何错误返回时，持久化记录都保持操作前的内容。
#[derive(Error, Debug)]
pub enum RoofError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// 记录内容无法解析
    #[error("Corrupt roof record: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// 物理命令无法下发
    #[error("Motor error: {0}")]
    Motor(#[from] DriverError),

    /// 电机报告 ERROR，需人工复位
    #[error("Roof motor faulted; reset required")]
    Faulted,

    #[error("Invalid user id: {0:?}")]
    InvalidUser(String),
}
