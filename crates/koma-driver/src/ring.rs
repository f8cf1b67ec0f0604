//! 定长环形缓冲区
//!
//! 满了之后每次写入都淘汰最旧的一项，读出顺序始终是到达顺序。

use std::collections::VecDeque;

/// 功率环形缓冲区容量（样本数）
pub const POWER_HISTORY_LEN: usize = 120;

/// 日志环形缓冲区容量（行数）
pub const LOG_HISTORY_LEN: usize = 3;

/// 定长环形缓冲区
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// 创建空缓冲区（容量至少为 1）
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 创建并用 `value` 填满的缓冲区
    ///
    /// 功率曲线按固定窗口绘制，初始填零可以让快照长度始终等于容量。
    pub fn filled(capacity: usize, value: T) -> Self {
        let mut ring = Self::new(capacity);
        ring.items.extend(std::iter::repeat_n(value, ring.capacity));
        ring
    }

    /// 追加一项，缓冲区已满时返回被淘汰的最旧项
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 最新一项
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// 按到达顺序复制出全部内容
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
