//! 驱动层错误类型定义

use koma_link::LinkError;
use koma_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 命令通道已关闭（TX 线程退出）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 命令通道已满
    #[error("Command channel full")]
    ChannelFull,

    /// 链路因传输故障停止，需要人工介入
    #[error("Motor link down: {0}")]
    LinkDown(String),

    /// 屋顶状态订阅只能领取一次
    #[error("Roof status already subscribed")]
    AlreadySubscribed,

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 功能未编译进来
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}
