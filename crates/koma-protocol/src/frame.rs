//! 入站帧解码器
//!
//! 逐字节状态机，把原始字符流还原为经过校验的 payload。
//!
//! ```text
//! WaitingStart --'$'--> InMessage --'*'--> Checksum1 --c1--> Checksum2 --c2--> WaitingStart
//!       ^                   |
//!       +--- 缓冲区满 200 ---+
//! ```
//!
//! 解码器永远不会报错：校验和不匹配返回 [`FrameResult::Invalid`]，
//! 超长的无结束符数据静默丢弃，两种情况都会回到 `WaitingStart` 重新同步。

use crate::checksum;
use crate::constants::{CHECKSUM_DELIMITER, FRAME_START, RESYNC_THRESHOLD};
use smallvec::SmallVec;

/// 解码器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    /// 等待 `$`，其它字符全部丢弃
    #[default]
    WaitingStart,
    /// 正在累积 payload
    InMessage,
    /// 等待第一个校验和字符
    Checksum1,
    /// 等待第二个校验和字符
    Checksum2,
}

/// 单字节解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameResult {
    /// 帧尚未结束
    Incomplete,
    /// 帧结束且校验通过，携带 payload
    Valid(String),
    /// 帧结束但校验失败（payload 已丢弃）
    Invalid,
}

impl FrameResult {
    /// 是否已读完一帧（无论校验成败）
    pub fn is_complete(&self) -> bool {
        !matches!(self, FrameResult::Incomplete)
    }

    /// 是否校验通过
    pub fn is_success(&self) -> bool {
        matches!(self, FrameResult::Valid(_))
    }

    /// 校验通过时返回 payload，否则返回空串
    pub fn message(&self) -> &str {
        match self {
            FrameResult::Valid(message) => message,
            _ => "",
        }
    }

    /// 取出 payload
    pub fn into_message(self) -> Option<String> {
        match self {
            FrameResult::Valid(message) => Some(message),
            _ => None,
        }
    }
}

/// 一个数据块内完成的帧
///
/// 典型数据块里只有 0~2 帧，栈上预留 2 个位置避免堆分配。
pub type CompletedFrames = SmallVec<[FrameResult; 2]>;

/// 帧解码器
///
/// 可无限次重复使用；每个字节单独喂入，因此一个数据块中可以包含任意多帧，
/// 也可以在任意位置被切开。
///
/// # Example
///
/// ```
/// use koma_protocol::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new();
/// let frames = decoder.feed(b"$OPEN*14\r\n");
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].message(), "OPEN");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    state: DecoderState,
    buffer: Vec<u8>,
    checksum: [u8; 2],
    resyncs: u64,
}

impl FrameDecoder {
    /// 创建新的解码器（初始状态 `WaitingStart`）
    pub fn new() -> Self {
        Self {
            state: DecoderState::WaitingStart,
            buffer: Vec::with_capacity(RESYNC_THRESHOLD),
            checksum: [0; 2],
            resyncs: 0,
        }
    }

    /// 当前状态
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// 已缓冲的 payload 字节数
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// 因超长 payload 而丢弃的次数
    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }

    /// 丢弃缓冲区，回到 `WaitingStart`
    pub fn reset(&mut self) {
        self.state = DecoderState::WaitingStart;
        self.buffer.clear();
        self.checksum = [0; 2];
    }

    /// 喂入一个字节
    pub fn consume(&mut self, byte: u8) -> FrameResult {
        match self.state {
            DecoderState::WaitingStart => {
                if byte == FRAME_START {
                    self.state = DecoderState::InMessage;
                    self.buffer.clear();
                }
                FrameResult::Incomplete
            },
            DecoderState::InMessage => {
                if byte == CHECKSUM_DELIMITER {
                    self.state = DecoderState::Checksum1;
                    return FrameResult::Incomplete;
                }
                self.buffer.push(byte);
                if self.buffer.len() >= RESYNC_THRESHOLD {
                    self.resyncs += 1;
                    self.reset();
                }
                FrameResult::Incomplete
            },
            DecoderState::Checksum1 => {
                self.checksum[0] = byte;
                self.state = DecoderState::Checksum2;
                FrameResult::Incomplete
            },
            DecoderState::Checksum2 => {
                self.checksum[1] = byte;
                let result = if self.checksum_matches() {
                    FrameResult::Valid(String::from_utf8_lossy(&self.buffer).into_owned())
                } else {
                    FrameResult::Invalid
                };
                self.reset();
                result
            },
        }
    }

    /// 喂入一个数据块，返回其中所有已完成的帧（含校验失败的帧）
    pub fn feed(&mut self, chunk: &[u8]) -> CompletedFrames {
        chunk
            .iter()
            .map(|&byte| self.consume(byte))
            .filter(FrameResult::is_complete)
            .collect()
    }

    fn checksum_matches(&self) -> bool {
        let expected = checksum(&self.buffer);
        match (hex_nibble(self.checksum[0]), hex_nibble(self.checksum[1])) {
            (Some(hi), Some(lo)) => ((hi << 4) | lo) == expected,
            _ => false,
        }
    }
}

/// 十六进制字符转半字节（大小写均可）
fn hex_nibble(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}
