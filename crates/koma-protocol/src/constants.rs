//! 协议常量定义

/// 帧起始符
pub const FRAME_START: u8 = b'$';

/// payload 结束符（其后紧跟两位校验和）
pub const CHECKSUM_DELIMITER: u8 = b'*';

/// 帧结束序列
pub const FRAME_TERMINATOR: &str = "\r\n";

/// 解码缓冲区上限
///
/// 缓冲区累计到该长度仍未见到 `*` 时，解码器静默回到 `WaitingStart`。
pub const RESYNC_THRESHOLD: usize = 200;

/// 可被完整解码的最长 payload（字节）
pub const MAX_PAYLOAD_LEN: usize = RESYNC_THRESHOLD - 1;

/// 参数分隔符
pub const ARG_SEPARATOR: char = ',';

/// STATUS 消息中屋顶状态的键名
pub const ROOF_KEY: &str = "ROOF";

