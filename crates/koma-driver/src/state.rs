//! 链路共享状态
//!
//! RX 线程写入，`MotorLink` 的查询方法读取。

use crate::ring::{LOG_HISTORY_LEN, POWER_HISTORY_LEN, RingBuffer};
use arc_swap::ArcSwap;
use koma_protocol::RoofStatus;
use parking_lot::{Mutex, RwLock};

/// 电机状态快照
///
/// - `power`: 功率环形缓冲区，按到达顺序
/// - `status`: 最近一次 STATUS 消息的原始参数串
/// - `log`: 最近几行固件日志
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MotorStatus {
    pub power: Vec<i32>,
    pub status: String,
    pub log: Vec<String>,
}

/// 链路共享上下文
pub struct LinkContext {
    /// 功率采样
    pub power: RwLock<RingBuffer<i32>>,
    /// 最近一次状态行（原始文本）
    pub status_line: ArcSwap<String>,
    /// 固件日志
    pub log: RwLock<RingBuffer<String>>,
    /// 最近一次观察到的 ROOF 值
    pub last_roof: Mutex<Option<RoofStatus>>,
    /// 首个致命传输错误
    fault: Mutex<Option<String>>,
}

impl LinkContext {
    pub fn new() -> Self {
        Self {
            power: RwLock::new(RingBuffer::filled(POWER_HISTORY_LEN, 0)),
            status_line: ArcSwap::from_pointee(String::new()),
            log: RwLock::new(RingBuffer::filled(LOG_HISTORY_LEN, String::new())),
            last_roof: Mutex::new(None),
            fault: Mutex::new(None),
        }
    }

    /// 状态快照
    pub fn status(&self) -> MotorStatus {
        MotorStatus {
            power: self.power.read().snapshot(),
            status: self.status_line.load().as_ref().clone(),
            log: self.log.read().snapshot(),
        }
    }

    /// 记录致命错误（只保留第一个，后续错误多半是连锁反应）
    pub fn record_fault(&self, reason: impl Into<String>) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(reason.into());
        }
    }

    pub fn fault(&self) -> Option<String> {
        self.fault.lock().clone()
    }
}

impl Default for LinkContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LinkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkContext")
            .field("status_line", &self.status_line.load())
            .field("last_roof", &*self.last_roof.lock())
            .field("fault", &*self.fault.lock())
            .finish_non_exhaustive()
    }
}
