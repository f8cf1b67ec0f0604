//! 出站命令帧构建
//!
//! `"$" + command + ["," + arg]* + "*" + checksum + "\r\n"`

use crate::constants::{
    ARG_SEPARATOR, CHECKSUM_DELIMITER, FRAME_START, FRAME_TERMINATOR, MAX_PAYLOAD_LEN,
};
use crate::{ProtocolError, checksum, checksum_hex};
use std::fmt;

/// 为 payload 加上帧头、校验和与结束符
///
/// # 错误
/// - `PayloadTooLong`: payload 超过 [`MAX_PAYLOAD_LEN`]，解码端会将其当作噪声丢弃
/// - `ForbiddenByte`: payload 中含有 `$`、`*`、`\r` 或 `\n`
pub fn encode_frame(payload: &str) -> Result<String, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLong {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    if let Some(&byte) = payload.as_bytes().iter().find(|&&b| is_forbidden(b)) {
        return Err(ProtocolError::ForbiddenByte { byte });
    }
    Ok(frame_unchecked(payload))
}

/// 由命令和参数列表构建完整帧
///
/// # Example
///
/// ```
/// use koma_protocol::encode_command;
///
/// let frame = encode_command("SETSPEED", &["80"]).unwrap();
/// assert!(frame.starts_with("$SETSPEED,80*"));
/// assert!(frame.ends_with("\r\n"));
/// ```
pub fn encode_command<S: AsRef<str>>(command: &str, args: &[S]) -> Result<String, ProtocolError> {
    let mut payload = String::from(command);
    for arg in args {
        payload.push(ARG_SEPARATOR);
        payload.push_str(arg.as_ref());
    }
    encode_frame(&payload)
}

fn is_forbidden(byte: u8) -> bool {
    matches!(byte, FRAME_START | CHECKSUM_DELIMITER | b'\r' | b'\n')
}

fn frame_unchecked(payload: &str) -> String {
    let mut frame = String::with_capacity(payload.len() + 6);
    frame.push(FRAME_START as char);
    frame.push_str(payload);
    frame.push(CHECKSUM_DELIMITER as char);
    frame.push_str(&checksum_hex(checksum(payload.as_bytes())));
    frame.push_str(FRAME_TERMINATOR);
    frame
}

/// 控制器可识别的出站命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutboundCommand {
    /// 开启屋顶
    Open,
    /// 关闭屋顶
    Close,
    /// 立即停止电机
    Stop,
    /// 设置电机速度
    SetSpeed(i32),
}

impl OutboundCommand {
    /// 命令字
    pub fn token(&self) -> &'static str {
        match self {
            OutboundCommand::Open => "OPEN",
            OutboundCommand::Close => "CLOSE",
            OutboundCommand::Stop => "STOP",
            OutboundCommand::SetSpeed(_) => "SETSPEED",
        }
    }

    /// 帧内 payload（不含 `$`、`*` 与校验和）
    pub fn payload(&self) -> String {
        match self {
            OutboundCommand::SetSpeed(speed) => format!("{},{}", self.token(), speed),
            _ => self.token().to_string(),
        }
    }

    /// 编码为完整帧
    ///
    /// payload 只由命令字和整数组成，长度与字符集恒定合法，因此不会失败。
    pub fn encode(&self) -> String {
        frame_unchecked(&self.payload())
    }
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameDecoder;
    use proptest::prelude::*;

    #[test]
    fn test_fixed_commands_match_controller_firmware() {
        assert_eq!(OutboundCommand::Open.encode(), "$OPEN*14\r\n");
        assert_eq!(OutboundCommand::Close.encode(), "$CLOSE*56\r\n");
        assert_eq!(OutboundCommand::Stop.encode(), "$STOP*18\r\n");
    }

    #[test]
    fn test_set_speed_encoding() {
        let frame = OutboundCommand::SetSpeed(80).encode();
        let expected_sum = checksum(b"SETSPEED,80");
        assert_eq!(frame, format!("$SETSPEED,80*{:02X}\r\n", expected_sum));
        assert_eq!(OutboundCommand::SetSpeed(-5).payload(), "SETSPEED,-5");
    }

    #[test]
    fn test_checksum_is_zero_padded() {
        // 'A' ^ '@' = 0x01
        assert_eq!(encode_frame("A@").unwrap(), "$A@*01\r\n");
    }

    #[test]
    fn test_zero_checksum_encodes_as_00() {
        assert_eq!(encode_frame("ABAB").unwrap(), "$ABAB*00\r\n");
    }

    #[test]
    fn test_command_without_args() {
        let no_args: [&str; 0] = [];
        assert_eq!(encode_command("OPEN", &no_args).unwrap(), "$OPEN*14\r\n");
    }

    #[test]
    fn test_rejects_forbidden_bytes() {
        assert_eq!(
            encode_command("LOG", &["a*b"]),
            Err(ProtocolError::ForbiddenByte { byte: b'*' })
        );
        assert!(matches!(
            encode_frame("A$B"),
            Err(ProtocolError::ForbiddenByte { byte: b'$' })
        ));
        assert!(encode_frame("A\r\n").is_err());
    }

    #[test]
    fn test_rejects_overlong_payload() {
        let payload = "X".repeat(MAX_PAYLOAD_LEN + 1);
        assert_eq!(
            encode_frame(&payload),
            Err(ProtocolError::PayloadTooLong {
                len: MAX_PAYLOAD_LEN + 1,
                max: MAX_PAYLOAD_LEN
            })
        );
        assert!(encode_frame(&"X".repeat(MAX_PAYLOAD_LEN)).is_ok());
    }

    #[test]
    fn test_display_is_payload() {
        assert_eq!(OutboundCommand::SetSpeed(10).to_string(), "SETSPEED,10");
        assert_eq!(OutboundCommand::Stop.to_string(), "STOP");
    }

    proptest! {
        /// 编码后再解码，得到 `cmd,arg1,arg2...`
        #[test]
        fn encode_then_decode(
            cmd in "[A-Z]{1,10}",
            args in proptest::collection::vec("[a-z0-9=.]{0,8}", 0..6),
        ) {
            let frame = encode_command(&cmd, &args).unwrap();
            let mut decoder = FrameDecoder::new();
            let frames = decoder.feed(frame.as_bytes());
            prop_assert_eq!(frames.len(), 1);
            prop_assert!(frames[0].is_success());

            let mut expected = cmd.clone();
            if !args.is_empty() {
                expected.push(',');
                expected.push_str(&args.join(","));
            }
            prop_assert_eq!(frames[0].message(), expected.as_str());
        }
    }
}
