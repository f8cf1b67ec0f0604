//! RoofService：链路 + 仲裁器 + 状态泵

use koma_driver::{DriverError, LinkMetricsSnapshot, MotorLink, MotorStatus};
use koma_roof::{RoofArbiter, RoofError, RoofPhase, RoofState, RoofStore, RoofView};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 服务使用的仲裁器类型
pub type LinkArbiter<S> = RoofArbiter<S, Arc<MotorLink>>;

/// 屋顶服务
///
/// 把两条独立的流接到一起：
/// - 命令流：用户请求 → 仲裁器 → `MotorLink::open/close`
/// - 遥测流：RX 线程 → ROOF 事件通道 → 状态泵 → 仲裁器
///
/// Drop 时停止链路并等待状态泵退出。
pub struct RoofService<S: RoofStore + 'static> {
    link: Arc<MotorLink>,
    arbiter: Arc<LinkArbiter<S>>,
    pump: Option<JoinHandle<()>>,
}

impl<S: RoofStore + 'static> RoofService<S> {
    /// 使用默认记录键启动
    ///
    /// # 错误
    /// - `RoofError::Motor(DriverError::AlreadySubscribed)`: 链路的 ROOF 事件已被领取
    /// - `RoofError::Motor(DriverError::IoThread)`: 状态泵线程创建失败
    pub fn start(link: MotorLink, store: S) -> Result<Self, RoofError> {
        Self::start_with(link, |motor| RoofArbiter::new(store, motor))
    }

    /// 使用自定义记录键启动
    pub fn start_with_key(link: MotorLink, store: S, key: impl Into<String>) -> Result<Self, RoofError> {
        let key = key.into();
        Self::start_with(link, |motor| RoofArbiter::new(store, motor).with_key(key))
    }

    fn start_with<F>(link: MotorLink, make_arbiter: F) -> Result<Self, RoofError>
    where
        F: FnOnce(Arc<MotorLink>) -> LinkArbiter<S>,
    {
        let events = link.subscribe_roof_status()?;
        let link = Arc::new(link);
        let arbiter = Arc::new(make_arbiter(link.clone()));

        let pump = arbiter.spawn_status_pump(events).map_err(|e| {
            link.shutdown();
            DriverError::IoThread(format!("Failed to spawn status pump: {}", e))
        })?;

        info!(
            "Roof service started on {} (record key {:?})",
            link.description(),
            arbiter.key()
        );
        Ok(Self {
            link,
            arbiter,
            pump: Some(pump),
        })
    }

    pub fn request_open(&self, user: &str) -> Result<RoofState, RoofError> {
        self.arbiter.request_open(user)
    }

    pub fn request_close(&self, user: &str) -> Result<RoofState, RoofError> {
        self.arbiter.request_close(user)
    }

    pub fn view(&self, user: &str) -> Result<RoofView, RoofError> {
        self.arbiter.view(user)
    }

    pub fn phase(&self) -> Result<RoofPhase, RoofError> {
        self.arbiter.phase()
    }

    pub fn snapshot(&self) -> Result<RoofState, RoofError> {
        self.arbiter.snapshot()
    }

    pub fn reset_fault(&self) {
        self.arbiter.reset_fault()
    }

    /// 直接停止电机（不经过仲裁）
    pub fn stop(&self) -> Result<(), DriverError> {
        self.link.stop()
    }

    pub fn set_speed(&self, speed: i32) -> Result<(), DriverError> {
        self.link.set_speed(speed)
    }

    pub fn motor_status(&self) -> MotorStatus {
        self.link.status()
    }

    pub fn metrics(&self) -> LinkMetricsSnapshot {
        self.link.get_metrics()
    }

    pub fn link(&self) -> &MotorLink {
        &self.link
    }

    pub fn arbiter(&self) -> &LinkArbiter<S> {
        &self.arbiter
    }
}

impl<S: RoofStore + 'static> Drop for RoofService<S> {
    fn drop(&mut self) {
        // 链路停止后事件流断开，状态泵随之退出
        self.link.shutdown();

        if let Some(pump) = self.pump.take() {
            let timeout = Duration::from_millis(self.link.config().join_timeout_ms);
            let deadline = Instant::now() + timeout;
            while !pump.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            if pump.is_finished() {
                let _ = pump.join();
            } else {
                warn!("Roof status pump did not stop within {:?}", timeout);
            }
        }
    }
}
