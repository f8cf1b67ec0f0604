//! Builder 模式实现
//!
//! 提供链式构造 `MotorLink` 实例的便捷方式。

use crate::error::DriverError;
use crate::link::MotorLink;
use crate::pipeline::LinkConfig;
use koma_link::TcpTransport;
use std::time::Duration;

#[cfg(feature = "serial")]
pub use koma_link::serial::DEFAULT_BAUD_RATE;

/// 默认 TCP 连接超时
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// 传输方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// TCP 串口服务器，`host:port`
    Tcp(String),
    /// 本地串口设备，如 `/dev/ttyUSB0`、`COM3`
    Serial(String),
}

impl std::fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkTarget::Tcp(addr) => write!(f, "tcp://{}", addr),
            LinkTarget::Serial(device) => write!(f, "serial://{}", device),
        }
    }
}

/// MotorLink Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use koma_driver::{LinkConfig, MotorLinkBuilder};
///
/// let link = MotorLinkBuilder::new()
///     .tcp("192.168.1.50:4001")
///     .link_config(LinkConfig::default())
///     .build()
///     .unwrap();
/// link.open().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MotorLinkBuilder {
    target: Option<LinkTarget>,
    /// 串口波特率（TCP 模式忽略）
    #[cfg_attr(not(feature = "serial"), allow(dead_code))]
    baud_rate: Option<u32>,
    connect_timeout: Option<Duration>,
    link_config: Option<LinkConfig>,
}

impl MotorLinkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 通过 TCP 串口服务器连接
    pub fn tcp(mut self, addr: impl Into<String>) -> Self {
        self.target = Some(LinkTarget::Tcp(addr.into()));
        self
    }

    /// 通过本地串口连接
    pub fn serial(mut self, device: impl Into<String>) -> Self {
        self.target = Some(LinkTarget::Serial(device.into()));
        self
    }

    pub fn target(mut self, target: LinkTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// 设置串口波特率（默认 57600）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// 设置 TCP 连接超时（默认 3 秒）
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn link_config(mut self, config: LinkConfig) -> Self {
        self.link_config = Some(config);
        self
    }

    /// 建立连接并启动 IO 线程
    ///
    /// # 错误
    /// - `DriverError::InvalidConfig`: 未指定传输方式
    /// - `DriverError::NotImplemented`: 未启用 `serial` feature 却要求串口
    /// - `DriverError::Link`: 连接或打开设备失败
    pub fn build(self) -> Result<MotorLink, DriverError> {
        let target = self.target.clone().ok_or_else(|| {
            DriverError::InvalidConfig("no transport selected (use tcp() or serial())".to_string())
        })?;

        match &target {
            LinkTarget::Tcp(addr) => {
                let timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
                let stream = TcpTransport::connect(addr, timeout)?;
                Ok(MotorLink::new(stream, self.link_config)?.with_description(target.to_string()))
            },
            LinkTarget::Serial(device) => self.build_serial(device, &target),
        }
    }

    #[cfg(feature = "serial")]
    fn build_serial(&self, device: &str, target: &LinkTarget) -> Result<MotorLink, DriverError> {
        let baud_rate = self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
        let stream = koma_link::SerialTransport::open(device, baud_rate)?;
        Ok(MotorLink::new(stream, self.link_config.clone())?.with_description(target.to_string()))
    }

    #[cfg(not(feature = "serial"))]
    fn build_serial(&self, _device: &str, target: &LinkTarget) -> Result<MotorLink, DriverError> {
        Err(DriverError::NotImplemented(format!(
            "{} requires the `serial` feature",
            target
        )))
    }
}
