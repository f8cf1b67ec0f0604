//! MotorLink：电机控制器链路（对外 API）

use crate::error::DriverError;
use crate::metrics::{LinkMetrics, LinkMetricsSnapshot};
use crate::pipeline::{LinkConfig, rx_loop, tx_loop};
use crate::state::{LinkContext, MotorStatus};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use koma_link::SplittableStream;
use koma_protocol::{OutboundCommand, RoofStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info};

/// 带超时的线程 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);

        // 看门狗线程代为 join；超时后它继续存在，直到目标线程结束
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(Box::new(
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "Thread panicked during join"),
            )),
        }
    }
}

/// 链路健康状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkHealth {
    /// IO 线程均在运行
    Running,
    /// 链路已停止，附带首个故障原因（正常关闭时为 `None`）
    Down(Option<String>),
}

/// 电机控制器链路
///
/// 构造时把字节流拆成收发两半，各由一个后台线程独占：
/// - RX 线程解码入站帧，更新功率 / 状态 / 日志快照
/// - TX 线程按顺序写出命令
///
/// 传输故障不会自动重连：链路停止，后续命令返回 [`DriverError::LinkDown`]。
pub struct MotorLink {
    /// 命令发送端；Drop 时先释放，TX 线程才能收到 `Disconnected`
    cmd_tx: Option<Sender<OutboundCommand>>,
    /// ROOF 变化事件接收端（只能被领取一次）
    roof_rx: Mutex<Option<Receiver<RoofStatus>>>,
    ctx: Arc<LinkContext>,
    rx_thread: Option<JoinHandle<()>>,
    tx_thread: Option<JoinHandle<()>>,
    /// 运行标志（任一线程故障退出时置 false）
    is_running: Arc<AtomicBool>,
    metrics: Arc<LinkMetrics>,
    config: LinkConfig,
    /// 传输描述（地址或设备名），用于日志
    description: String,
}

impl MotorLink {
    /// 在已建立的字节流上启动链路
    ///
    /// # 错误
    /// - `DriverError::Link`: 字节流拆分或设置读超时失败
    /// - `DriverError::IoThread`: 线程创建失败
    pub fn new<S>(mut stream: S, config: Option<LinkConfig>) -> Result<Self, DriverError>
    where
        S: SplittableStream + Send + 'static,
        S::Rx: Send + 'static,
        S::Tx: Send + 'static,
    {
        let config = config.unwrap_or_default();
        stream.set_read_timeout(Duration::from_millis(config.read_timeout_ms.max(1)))?;
        let (rx, tx) = stream.split()?;

        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(config.command_queue_capacity.max(1));
        let (roof_tx, roof_rx) = crossbeam_channel::unbounded();

        let ctx = Arc::new(LinkContext::new());
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(LinkMetrics::new());

        let rx_thread = {
            let ctx = ctx.clone();
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            let config = config.clone();
            std::thread::Builder::new()
                .name("koma-rx".into())
                .spawn(move || rx_loop(rx, ctx, config, is_running, metrics, roof_tx))
                .map_err(|e| DriverError::IoThread(format!("Failed to spawn RX thread: {}", e)))?
        };

        let join_timeout = Duration::from_millis(config.join_timeout_ms);
        let spawned = {
            let ctx = ctx.clone();
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            let config = config.clone();
            std::thread::Builder::new()
                .name("koma-tx".into())
                .spawn(move || tx_loop(tx, cmd_rx, ctx, config, is_running, metrics))
        };
        let tx_thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                is_running.store(false, Ordering::Release);
                let _ = rx_thread.join_timeout(join_timeout);
                return Err(DriverError::IoThread(format!("Failed to spawn TX thread: {}", e)));
            },
        };

        Ok(Self {
            cmd_tx: Some(cmd_tx),
            roof_rx: Mutex::new(Some(roof_rx)),
            ctx,
            rx_thread: Some(rx_thread),
            tx_thread: Some(tx_thread),
            is_running,
            metrics,
            config,
            description: "stream".to_string(),
        })
    }

    /// 设置传输描述（由 Builder 调用）
    pub(crate) fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 请求开顶
    pub fn open(&self) -> Result<(), DriverError> {
        self.send(OutboundCommand::Open)
    }

    /// 请求关顶
    pub fn close(&self) -> Result<(), DriverError> {
        self.send(OutboundCommand::Close)
    }

    /// 停止电机
    pub fn stop(&self) -> Result<(), DriverError> {
        self.send(OutboundCommand::Stop)
    }

    /// 设置电机速度档位（数值由固件解释）
    pub fn set_speed(&self, speed: i32) -> Result<(), DriverError> {
        self.send(OutboundCommand::SetSpeed(speed))
    }

    /// 命令入队（非阻塞）
    ///
    /// # 错误
    /// - `DriverError::LinkDown`: 链路已因故障停止
    /// - `DriverError::ChannelFull`: 队列已满
    /// - `DriverError::ChannelClosed`: TX 线程已退出
    pub fn send(&self, command: OutboundCommand) -> Result<(), DriverError> {
        if let LinkHealth::Down(reason) = self.health() {
            return Err(DriverError::LinkDown(
                reason.unwrap_or_else(|| "link stopped".to_string()),
            ));
        }

        let cmd_tx = self.cmd_tx.as_ref().ok_or(DriverError::ChannelClosed)?;
        match cmd_tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.tx_queue_full.fetch_add(1, Ordering::Relaxed);
                Err(DriverError::ChannelFull)
            },
            Err(TrySendError::Disconnected(_)) => Err(DriverError::ChannelClosed),
        }
    }

    /// 当前电机状态快照
    pub fn status(&self) -> MotorStatus {
        self.ctx.status()
    }

    /// 最近一次观察到的 ROOF 值
    pub fn roof_status(&self) -> Option<RoofStatus> {
        self.ctx.last_roof.lock().clone()
    }

    /// 领取 ROOF 变化事件流
    ///
    /// 每次 ROOF 值与上一次不同时推送一个事件。链路停止后接收端返回 `Disconnected`。
    ///
    /// # 错误
    /// - `DriverError::AlreadySubscribed`: 已被领取过
    pub fn subscribe_roof_status(&self) -> Result<Receiver<RoofStatus>, DriverError> {
        self.roof_rx.lock().take().ok_or(DriverError::AlreadySubscribed)
    }

    /// 链路健康状态
    pub fn health(&self) -> LinkHealth {
        let (rx_alive, tx_alive) = self.check_health();
        if self.is_running.load(Ordering::Acquire) && rx_alive && tx_alive {
            LinkHealth::Running
        } else {
            LinkHealth::Down(self.ctx.fault())
        }
    }

    /// 检查 IO 线程是否存活，返回 `(rx_alive, tx_alive)`
    pub fn check_health(&self) -> (bool, bool) {
        let rx_alive = self.rx_thread.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        let tx_alive = self.tx_thread.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        (rx_alive, tx_alive)
    }

    pub fn is_healthy(&self) -> bool {
        self.health() == LinkHealth::Running
    }

    /// 获取链路指标快照
    pub fn get_metrics(&self) -> LinkMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 通知 IO 线程退出（不等待）
    ///
    /// 之后 ROOF 事件流断开，命令返回 `LinkDown`。线程在 Drop 时 join。
    pub fn shutdown(&self) {
        self.is_running.store(false, Ordering::Release);
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Drop for MotorLink {
    fn drop(&mut self) {
        // 先释放发送端：TX 线程写完队列中剩余命令后收到 Disconnected 退出
        self.cmd_tx.take();

        let join_timeout = Duration::from_millis(self.config.join_timeout_ms);

        if let Some(handle) = self.tx_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "TX thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }

        self.is_running.store(false, Ordering::Release);

        if let Some(handle) = self.rx_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "RX thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }

        info!("Motor link {} closed", self.description);
    }
}
