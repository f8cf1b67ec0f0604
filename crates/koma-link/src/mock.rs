//! Mock 传输（无硬件，供测试使用）
//!
//! [`MockStream::pair`] 返回一对端点：`MockStream` 交给被测代码，
//! `MockPeer` 留在测试里扮演电机控制器，可以注入入站字节、读取出站字节、制造故障。

use crate::{
    ByteStream, LinkDeviceError, LinkDeviceErrorKind, LinkError, RxStream, SplittableStream,
    TxStream,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Default)]
struct FaultFlags {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// 被测代码持有的一端
pub struct MockStream {
    rx: MockRx,
    tx: MockTx,
}

/// 测试持有的一端（模拟控制器）
#[derive(Clone)]
pub struct MockPeer {
    inbound: Sender<Vec<u8>>,
    outbound: Receiver<Vec<u8>>,
    faults: Arc<FaultFlags>,
}

impl MockStream {
    /// 创建一对相连的端点
    pub fn pair() -> (MockStream, MockPeer) {
        let (inbound_tx, inbound_rx) = unbounded();
        let (outbound_tx, outbound_rx) = unbounded();
        let faults = Arc::new(FaultFlags::default());
        let stream = MockStream {
            rx: MockRx {
                inbound: inbound_rx,
                pending: Vec::new(),
                timeout: Duration::from_millis(10),
                faults: faults.clone(),
            },
            tx: MockTx {
                outbound: outbound_tx,
                faults: faults.clone(),
            },
        };
        let peer = MockPeer {
            inbound: inbound_tx,
            outbound: outbound_rx,
            faults,
        };
        (stream, peer)
    }
}

impl MockPeer {
    /// 向被测代码注入入站字节
    pub fn inject(&self, bytes: impl AsRef<[u8]>) {
        let _ = self.inbound.send(bytes.as_ref().to_vec());
    }

    /// 取出目前为止全部出站字节（非阻塞）
    pub fn written(&self) -> Vec<u8> {
        self.outbound.try_iter().flatten().collect()
    }

    /// 取出目前为止全部出站字节并转为字符串
    pub fn written_string(&self) -> String {
        String::from_utf8_lossy(&self.written()).into_owned()
    }

    /// 等待下一次写入（一次 `write_all` 对应一块）
    pub fn next_write(&self, timeout: Duration) -> Option<String> {
        self.outbound
            .recv_timeout(timeout)
            .ok()
            .map(|chunk| String::from_utf8_lossy(&chunk).into_owned())
    }

    /// 此后的读操作全部返回设备错误
    pub fn fail_reads(&self) {
        self.faults.fail_reads.store(true, Ordering::Relaxed);
    }

    /// 此后的写操作全部返回设备错误
    pub fn fail_writes(&self) {
        self.faults.fail_writes.store(true, Ordering::Relaxed);
    }
}

/// Mock 读半边
pub struct MockRx {
    inbound: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    timeout: Duration,
    faults: Arc<FaultFlags>,
}

/// Mock 写半边
pub struct MockTx {
    outbound: Sender<Vec<u8>>,
    faults: Arc<FaultFlags>,
}

impl RxStream for MockRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if self.faults.fail_reads.load(Ordering::Relaxed) {
            return Err(LinkError::Device(LinkDeviceError::new(
                LinkDeviceErrorKind::NoDevice,
                "Device disconnected",
            )));
        }

        if self.pending.is_empty() {
            // 已有数据时不等待
            let chunk = match self.inbound.try_recv() {
                Ok(chunk) => chunk,
                Err(TryRecvError::Disconnected) => return Err(LinkError::Closed),
                Err(TryRecvError::Empty) => match self.inbound.recv_timeout(self.timeout) {
                    Ok(chunk) => chunk,
                    Err(RecvTimeoutError::Timeout) => return Err(LinkError::Timeout),
                    Err(RecvTimeoutError::Disconnected) => return Err(LinkError::Closed),
                },
            };
            self.pending = chunk;
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        if n == 0 {
            // 注入了空块
            return Err(LinkError::Timeout);
        }
        Ok(n)
    }
}

impl TxStream for MockTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.faults.fail_writes.load(Ordering::Relaxed) {
            return Err(LinkError::Device(LinkDeviceError::new(
                LinkDeviceErrorKind::NoDevice,
                "Device disconnected",
            )));
        }
        self.outbound.send(bytes.to_vec()).map_err(|_| LinkError::Closed)
    }
}

impl ByteStream for MockStream {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.tx.write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        self.rx.read(buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), LinkError> {
        self.rx.timeout = timeout;
        Ok(())
    }
}

impl SplittableStream for MockStream {
    type Rx = MockRx;
    type Tx = MockTx;

    fn split(self) -> Result<(Self::Rx, Self::Tx), LinkError> {
        Ok((self.rx, self.tx))
    }
}
