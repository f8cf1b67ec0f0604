//! Pipeline IO 循环模块
//!
//! RX 线程：读字节流 → 帧解码 → 分发到共享状态，ROOF 变化推送给订阅方。
//! TX 线程：从命令队列取命令 → 编码 → 写字节流。

use crate::metrics::LinkMetrics;
use crate::state::LinkContext;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use koma_link::{LinkError, RxStream, TxStream};
use koma_protocol::{FrameDecoder, FrameResult, InboundMessage, OutboundCommand, RoofStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Pipeline 配置
///
/// # Example
///
/// ```
/// use koma_driver::LinkConfig;
///
/// let config = LinkConfig {
///     read_timeout_ms: 20,
///     ..LinkConfig::default()
/// };
/// assert_eq!(config.command_queue_capacity, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// 读超时（毫秒），也是 RX 线程检查退出标志的周期
    pub read_timeout_ms: u64,
    /// 命令队列容量
    pub command_queue_capacity: usize,
    /// 单次读取的最大字节数
    pub read_chunk_size: usize,
    /// 关闭时等待 IO 线程退出的上限（毫秒）
    pub join_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 50,
            command_queue_capacity: 10,
            read_chunk_size: 256,
            join_timeout_ms: 500,
        }
    }
}

/// 处理一条校验通过的 payload
///
/// 解析失败的消息整条丢弃，不影响已有状态。
pub(crate) fn handle_payload(
    payload: &str,
    ctx: &LinkContext,
    metrics: &LinkMetrics,
    roof_tx: &Sender<RoofStatus>,
) {
    match InboundMessage::from_payload(payload) {
        Ok(InboundMessage::Power(samples)) => {
            let mut power = ctx.power.write();
            for sample in samples {
                power.push(sample);
            }
        },
        Ok(InboundMessage::Status(line)) => {
            let roof = line.roof();
            ctx.status_line.store(Arc::new(line.raw().to_string()));

            if let Some(roof) = roof {
                let mut last = ctx.last_roof.lock();
                if last.as_ref() != Some(&roof) {
                    debug!("Roof status changed: {:?} -> {}", *last, roof);
                    // 无人订阅时发送失败，忽略
                    let _ = roof_tx.send(roof.clone());
                    *last = Some(roof);
                }
            }
        },
        Ok(InboundMessage::Log(line)) => {
            info!(target: "koma_driver::firmware", "{}", line);
            ctx.log.write().push(line);
        },
        Ok(InboundMessage::Unknown(message)) => {
            metrics.rx_unknown_commands.fetch_add(1, Ordering::Relaxed);
            debug!("Ignoring unknown command: {}", message.command);
        },
        Err(e) => {
            metrics.rx_malformed.fetch_add(1, Ordering::Relaxed);
            warn!("Dropping malformed message {:?}: {}", payload, e);
        },
    }
}

/// 传输故障：记录、停机
fn on_transport_fault(
    side: &str,
    err: &LinkError,
    ctx: &LinkContext,
    is_running: &AtomicBool,
    metrics: &LinkMetrics,
) {
    error!("{} thread: fatal transport error, stopping link: {}", side, err);
    metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
    ctx.record_fault(err.to_string());
    // Release: 保证 fault 写入对读到 false 的线程可见
    is_running.store(false, Ordering::Release);
}

/// RX 线程主循环
///
/// 退出时 `roof_tx` 随之释放，订阅方的 `recv` 会返回 `Disconnected`。
pub fn rx_loop(
    mut rx: impl RxStream,
    ctx: Arc<LinkContext>,
    config: LinkConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<LinkMetrics>,
    roof_tx: Sender<RoofStatus>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; config.read_chunk_size.max(1)];

    loop {
        // Acquire: 看到 false 时必须也能看到其它线程的清理写入
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let n = match rx.read(&mut buf) {
            Ok(n) => n,
            Err(LinkError::Timeout) => continue,
            Err(e) => {
                on_transport_fault("RX", &e, &ctx, &is_running, &metrics);
                break;
            },
        };
        metrics.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);

        let resyncs_before = decoder.resync_count();
        let frames = decoder.feed(&buf[..n]);
        let resyncs = decoder.resync_count() - resyncs_before;
        if resyncs > 0 {
            metrics.rx_resyncs.fetch_add(resyncs, Ordering::Relaxed);
            warn!("RX thread: frame buffer overflow, resynchronised {} time(s)", resyncs);
        }

        for frame in frames {
            match frame {
                FrameResult::Valid(payload) => {
                    metrics.rx_frames_valid.fetch_add(1, Ordering::Relaxed);
                    handle_payload(&payload, &ctx, &metrics, &roof_tx);
                },
                FrameResult::Invalid => {
                    metrics.rx_checksum_errors.fetch_add(1, Ordering::Relaxed);
                    debug!("RX thread: dropping frame with bad checksum");
                },
                FrameResult::Incomplete => {},
            }
        }
    }

    trace!("RX thread: exited");
}

/// TX 线程主循环
///
/// 命令队列的所有发送端都释放后退出。
pub fn tx_loop(
    mut tx: impl TxStream,
    cmd_rx: Receiver<OutboundCommand>,
    ctx: Arc<LinkContext>,
    config: LinkConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<LinkMetrics>,
) {
    let poll = Duration::from_millis(config.read_timeout_ms.max(1));

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("TX thread: is_running flag is false, exiting");
            break;
        }

        let command = match cmd_rx.recv_timeout(poll) {
            Ok(command) => command,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                trace!("TX thread: command channel disconnected, exiting");
                break;
            },
        };

        let frame = command.encode();
        match tx.write_all(frame.as_bytes()) {
            Ok(()) => {
                metrics.tx_commands.fetch_add(1, Ordering::Relaxed);
                debug!("TX thread: sent {}", command);
            },
            Err(e) => {
                on_transport_fault("TX", &e, &ctx, &is_running, &metrics);
                break;
            },
        }
    }

    trace!("TX thread: exited");
}
