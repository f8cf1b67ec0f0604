//! TCP 传输（串口服务器 / ser2net）

use crate::{ByteStream, LinkError, RxStream, SplittableStream, TxStream, map_read_error};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// 连接到串口服务器的 TCP 字节流
pub struct TcpTransport {
    stream: TcpStream,
    peer: String,
}

impl TcpTransport {
    /// 连接到 `addr`，对每个解析出的地址依次尝试
    ///
    /// # 错误
    /// - `LinkError::Io`: 地址无法解析或全部连接失败（返回最后一个错误）
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, LinkError> {
        let mut last_err = None;
        for socket_addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&socket_addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    info!("Connected to motor controller at {}", socket_addr);
                    return Ok(Self {
                        stream,
                        peer: socket_addr.to_string(),
                    });
                },
                Err(e) => {
                    debug!("Connect to {} failed: {}", socket_addr, e);
                    last_err = Some(e);
                },
            }
        }
        Err(LinkError::Io(last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address resolved for {}", addr),
            )
        })))
    }

    /// 由已建立的连接创建（测试或外部接管连接时使用）
    pub fn from_stream(stream: TcpStream) -> Result<Self, LinkError> {
        let peer = stream.peer_addr()?.to_string();
        Ok(Self { stream, peer })
    }

    /// 对端地址
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl ByteStream for TcpTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        read_tcp(&mut self.stream, buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), LinkError> {
        // Duration::ZERO 会被 std 拒绝，换成最小可用值
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(())
    }
}

fn read_tcp(stream: &mut TcpStream, buf: &mut [u8]) -> Result<usize, LinkError> {
    match stream.read(buf) {
        Ok(0) => Err(LinkError::Closed),
        Ok(n) => Ok(n),
        Err(e) => Err(map_read_error(e)),
    }
}

/// TCP 读半边
pub struct TcpRx(TcpStream);

/// TCP 写半边
pub struct TcpTx(TcpStream);

impl RxStream for TcpRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        read_tcp(&mut self.0, buf)
    }
}

impl TxStream for TcpTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.0.write_all(bytes)?;
        self.0.flush()?;
        Ok(())
    }
}

impl SplittableStream for TcpTransport {
    type Rx = TcpRx;
    type Tx = TcpTx;

    fn split(self) -> Result<(Self::Rx, Self::Tx), LinkError> {
        let tx = self.stream.try_clone()?;
        Ok((TcpRx(self.stream), TcpTx(tx)))
    }
}
