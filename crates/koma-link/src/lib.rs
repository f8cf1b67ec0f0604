//! # Koma Link Layer
//!
//! 字节流传输抽象层：电机控制器可以挂在 TCP 串口服务器上，也可以直连 USB 串口。
//! 上层只依赖这里的 trait，不关心具体传输方式。
//!
//! ## 读语义
//!
//! - `Ok(n)`: 读到 `n > 0` 个字节
//! - `Err(LinkError::Timeout)`: 超时内没有数据（正常情况，调用方继续轮询）
//! - `Err(LinkError::Closed)`: 对端关闭
//! - 其它错误：传输故障

use std::time::Duration;
use thiserror::Error;

pub mod tcp;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use tcp::TcpTransport;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] LinkDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Stream closed by peer")]
    Closed,
}

impl LinkError {
    /// 是否应终止链路
    ///
    /// 只有读超时属于正常情况，其余错误都视为致命，不做自动重连。
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LinkError::Timeout)
    }
}

/// 设备错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    UnsupportedConfig,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct LinkDeviceError {
    pub kind: LinkDeviceErrorKind,
    pub message: String,
}

impl LinkDeviceError {
    pub fn new(kind: LinkDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<String> for LinkDeviceError {
    fn from(message: String) -> Self {
        Self::new(LinkDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for LinkDeviceError {
    fn from(message: &str) -> Self {
        Self::new(LinkDeviceErrorKind::Unknown, message)
    }
}

/// 双向字节流
pub trait ByteStream {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;
    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), LinkError> {
        Ok(())
    }
}

/// 只读半边（由 RX 线程独占）
pub trait RxStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;
}

/// 只写半边（由 TX 线程独占）
pub trait TxStream {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// 可拆分为独立收发两半的字节流
pub trait SplittableStream: ByteStream {
    type Rx: RxStream;
    type Tx: TxStream;
    fn split(self) -> Result<(Self::Rx, Self::Tx), LinkError>;
}

/// 把 `std::io` 读错误映射为链路错误
pub(crate) fn map_read_error(err: std::io::Error) -> LinkError {
    match err.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => LinkError::Timeout,
        std::io::ErrorKind::UnexpectedEof => LinkError::Closed,
        _ => LinkError::Io(err),
    }
}
