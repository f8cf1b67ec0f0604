//! 串口直连传输

use crate::{
    ByteStream, LinkDeviceError, LinkDeviceErrorKind, LinkError, RxStream, SplittableStream,
    TxStream, map_read_error,
};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::info;

/// 控制器固件使用的默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// 串口字节流
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    device: String,
}

impl SerialTransport {
    /// 打开串口设备（8N1，无流控）
    ///
    /// # 错误
    /// - `LinkError::Device`: 设备不存在、无权限或参数不受支持
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, LinkError> {
        let port = serialport::new(device, baud_rate)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| LinkError::Device(map_serial_error(device, e)))?;
        info!("Serial port {} opened at {} baud", device, baud_rate);
        Ok(Self {
            port,
            device: device.to_string(),
        })
    }

    /// 设备路径
    pub fn device(&self) -> &str {
        &self.device
    }
}

fn map_serial_error(device: &str, err: serialport::Error) -> LinkDeviceError {
    let kind = match err.kind() {
        serialport::ErrorKind::NoDevice => LinkDeviceErrorKind::NoDevice,
        serialport::ErrorKind::InvalidInput => LinkDeviceErrorKind::UnsupportedConfig,
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => LinkDeviceErrorKind::NotFound,
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            LinkDeviceErrorKind::AccessDenied
        },
        serialport::ErrorKind::Io(_) => LinkDeviceErrorKind::Backend,
        serialport::ErrorKind::Unknown => LinkDeviceErrorKind::Unknown,
    };
    LinkDeviceError::new(kind, format!("{}: {}", device, err))
}

fn read_serial(port: &mut dyn SerialPort, buf: &mut [u8]) -> Result<usize, LinkError> {
    match port.read(buf) {
        // 串口没有 EOF 概念，0 字节等同于超时
        Ok(0) => Err(LinkError::Timeout),
        Ok(n) => Ok(n),
        Err(e) => Err(map_read_error(e)),
    }
}

impl ByteStream for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        read_serial(self.port.as_mut(), buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), LinkError> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| LinkError::Device(map_serial_error(&self.device, e)))
    }
}

/// 串口读半边
pub struct SerialRx(Box<dyn SerialPort>);

/// 串口写半边
pub struct SerialTx(Box<dyn SerialPort>);

impl RxStream for SerialRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        read_serial(self.0.as_mut(), buf)
    }
}

impl TxStream for SerialTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.0.write_all(bytes)?;
        self.0.flush()?;
        Ok(())
    }
}

impl SplittableStream for SerialTransport {
    type Rx = SerialRx;
    type Tx = SerialTx;

    fn split(self) -> Result<(Self::Rx, Self::Tx), LinkError> {
        let tx = self
            .port
            .try_clone()
            .map_err(|e| LinkError::Device(map_serial_error(&self.device, e)))?;
        Ok((SerialRx(self.port), SerialTx(tx)))
    }
}
