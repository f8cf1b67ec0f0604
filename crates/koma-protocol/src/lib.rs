//! # Koma Protocol
//!
//! 屋顶电机控制器串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量（帧界定符、长度上限）
//! - `frame`: 入站字符流的逐字节帧解码器
//! - `encoder`: 出站命令帧构建
//! - `message`: 消息拆分与分类（POWER / STATUS / LOG）
//!
//! ## 帧格式
//!
//! ```text
//! $<payload>*<CK><CR><LF>
//! ```
//!
//! `CK` 为 payload 全部字节的 XOR，两位大写十六进制，左侧补零。
//! 解码时校验和比较不区分大小写。

pub mod constants;
pub mod encoder;
pub mod frame;
pub mod message;

// 重新导出常用类型
pub use constants::*;
pub use encoder::{OutboundCommand, encode_command, encode_frame};
pub use frame::{DecoderState, FrameDecoder, FrameResult};
pub use message::{InboundMessage, Message, RoofStatus, StatusLine};

use thiserror::Error;

/// 协议错误类型
///
/// 注意：校验和不匹配不属于错误，解码器以 [`FrameResult::Invalid`] 静默报告并重新同步。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Forbidden byte 0x{byte:02X} in payload")]
    ForbiddenByte { byte: u8 },

    #[error("Invalid value for field {field}: {value:?}")]
    InvalidValue { field: String, value: String },
}

/// 计算 payload 的 XOR 校验和
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, b| acc ^ b)
}

/// 校验和渲染为两位大写十六进制
pub fn checksum_hex(sum: u8) -> String {
    format!("{:02X}", sum)
}
