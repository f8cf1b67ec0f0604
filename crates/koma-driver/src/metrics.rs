//! 链路指标
//!
//! 原子计数器，RX/TX 线程写入，任意线程读取快照，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 链路实时指标
#[derive(Debug, Default)]
pub struct LinkMetrics {
    /// 收到的原始字节数
    pub rx_bytes: AtomicU64,
    /// 校验通过的帧数
    pub rx_frames_valid: AtomicU64,
    /// 校验失败的帧数
    pub rx_checksum_errors: AtomicU64,
    /// 超长 payload 导致的重新同步次数
    pub rx_resyncs: AtomicU64,
    /// 未识别的命令字
    pub rx_unknown_commands: AtomicU64,
    /// 字段无法解析的消息（整条丢弃）
    pub rx_malformed: AtomicU64,
    /// 成功写出的命令数
    pub tx_commands: AtomicU64,
    /// 命令队列满被拒绝的次数
    pub tx_queue_full: AtomicU64,
    /// 传输故障次数
    pub transport_errors: AtomicU64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LinkMetricsSnapshot {
        LinkMetricsSnapshot {
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            rx_frames_valid: self.rx_frames_valid.load(Ordering::Relaxed),
            rx_checksum_errors: self.rx_checksum_errors.load(Ordering::Relaxed),
            rx_resyncs: self.rx_resyncs.load(Ordering::Relaxed),
            rx_unknown_commands: self.rx_unknown_commands.load(Ordering::Relaxed),
            rx_malformed: self.rx_malformed.load(Ordering::Relaxed),
            tx_commands: self.tx_commands.load(Ordering::Relaxed),
            tx_queue_full: self.tx_queue_full.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LinkMetricsSnapshot {
    pub rx_bytes: u64,
    pub rx_frames_valid: u64,
    pub rx_checksum_errors: u64,
    pub rx_resyncs: u64,
    pub rx_unknown_commands: u64,
    pub rx_malformed: u64,
    pub tx_commands: u64,
    pub tx_queue_full: u64,
    pub transport_errors: u64,
}

impl LinkMetricsSnapshot {
    /// 帧校验失败率（百分比），没有收到帧时为 0
    pub fn checksum_error_rate(&self) -> f64 {
        let total = self.rx_frames_valid + self.rx_checksum_errors;
        if total == 0 {
            return 0.0;
        }
        (self.rx_checksum_errors as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = LinkMetrics::new();
        metrics.rx_frames_valid.fetch_add(3, Ordering::Relaxed);
        metrics.rx_checksum_errors.fetch_add(1, Ordering::Relaxed);
        metrics.tx_commands.fetch_add(2, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rx_frames_valid, 3);
        assert_eq!(snapshot.rx_checksum_errors, 1);
        assert_eq!(snapshot.tx_commands, 2);
        assert!((snapshot.checksum_error_rate() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_rate_without_frames() {
        assert_eq!(LinkMetricsSnapshot::default().checksum_error_rate(), 0.0);
    }
}
