//! 入站消息拆分与分类
//!
//! 控制器上报三类消息：
//!
//! - `POWER,<int>[,<int>...]`: 电机电流采样
//! - `STATUS,<key>=<value>[,...]`: 状态行，其中 `ROOF` 键为屋顶状态
//! - `LOG,<free text>`: 固件日志

use crate::ProtocolError;
use crate::constants::{ARG_SEPARATOR, ROOF_KEY};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// 校验通过的 payload，按第一个逗号拆分为命令字和参数串
///
/// 没有逗号时整段为命令字，参数串为空。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub command: String,
    pub args: String,
}

impl Message {
    pub fn parse(payload: &str) -> Self {
        match payload.split_once(ARG_SEPARATOR) {
            Some((command, args)) => Self {
                command: command.to_string(),
                args: args.to_string(),
            },
            None => Self {
                command: payload.to_string(),
                args: String::new(),
            },
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.command)
        } else {
            write!(f, "{}{}{}", self.command, ARG_SEPARATOR, self.args)
        }
    }
}

/// STATUS 消息中 `ROOF` 键的取值
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoofStatus {
    Stopped,
    Opening,
    Open,
    Closing,
    Closed,
    Error,
    /// 固件上报了未知取值（如 `STOPPING`），原样保留
    Other(String),
}

impl RoofStatus {
    /// 线上文本形式
    pub fn as_str(&self) -> &str {
        match self {
            RoofStatus::Stopped => "STOPPED",
            RoofStatus::Opening => "OPENING",
            RoofStatus::Open => "OPEN",
            RoofStatus::Closing => "CLOSING",
            RoofStatus::Closed => "CLOSED",
            RoofStatus::Error => "ERROR",
            RoofStatus::Other(value) => value,
        }
    }

    /// 是否为屋顶运动中的过程状态
    pub fn is_in_progress(&self) -> bool {
        matches!(self, RoofStatus::Opening | RoofStatus::Closing)
    }
}

impl FromStr for RoofStatus {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "STOPPED" => RoofStatus::Stopped,
            "OPENING" => RoofStatus::Opening,
            "OPEN" => RoofStatus::Open,
            "CLOSING" => RoofStatus::Closing,
            "CLOSED" => RoofStatus::Closed,
            "ERROR" => RoofStatus::Error,
            other => RoofStatus::Other(other.to_string()),
        })
    }
}

impl fmt::Display for RoofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解析后的状态行
///
/// 保留原始文本（对外展示用）以及按出现顺序排列的 `key=value` 对。
/// 不含 `=` 的片段视为值为空串的键。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusLine {
    raw: String,
    fields: Vec<(String, String)>,
}

impl StatusLine {
    pub fn parse(raw: &str) -> Self {
        let fields = raw
            .split(ARG_SEPARATOR)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (part.to_string(), String::new()),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            fields,
        }
    }

    /// 原始状态行文本
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// 全部键值对
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// 按键查找（重复键取最后一次出现的值）
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `ROOF` 键的取值；状态行不含该键时为 `None`
    pub fn roof(&self) -> Option<RoofStatus> {
        self.get(ROOF_KEY).map(|value| match value.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        })
    }
}

/// 分类后的入站消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// 功率采样（按到达顺序）
    Power(Vec<i32>),
    /// 状态行
    Status(StatusLine),
    /// 固件日志文本
    Log(String),
    /// 未识别的命令字
    Unknown(Message),
}

impl InboundMessage {
    /// 按命令字分类
    ///
    /// # 错误
    /// - `InvalidValue`: POWER 中存在无法解析为整数的值（整条消息作废）
    pub fn classify(message: Message) -> Result<Self, ProtocolError> {
        match message.command.as_str() {
            "POWER" => parse_power(&message.args).map(InboundMessage::Power),
            "STATUS" => Ok(InboundMessage::Status(StatusLine::parse(&message.args))),
            "LOG" => Ok(InboundMessage::Log(message.args)),
            _ => Ok(InboundMessage::Unknown(message)),
        }
    }

    /// 直接从 payload 拆分并分类
    pub fn from_payload(payload: &str) -> Result<Self, ProtocolError> {
        Self::classify(Message::parse(payload))
    }
}

fn parse_power(args: &str) -> Result<Vec<i32>, ProtocolError> {
    if args.is_empty() {
        return Ok(Vec::new());
    }
    args.split(ARG_SEPARATOR)
        .map(|value| {
            value
                .trim()
                .parse::<i32>()
                .map_err(|_| ProtocolError::InvalidValue {
                    field: "POWER".to_string(),
                    value: value.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_split_at_first_comma() {
        let msg = Message::parse("STATUS,ROOF=OPEN,SPEED=80");
        assert_eq!(msg.command, "STATUS");
        assert_eq!(msg.args, "ROOF=OPEN,SPEED=80");
        assert_eq!(msg.to_string(), "STATUS,ROOF=OPEN,SPEED=80");
    }

    #[test]
    fn test_message_without_comma() {
        let msg = Message::parse("PING");
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.args, "");
        assert_eq!(msg.to_string(), "PING");
    }

    #[test]
    fn test_classify_power() {
        let inbound = InboundMessage::from_payload("POWER,12,-3, 40").unwrap();
        assert_eq!(inbound, InboundMessage::Power(vec![12, -3, 40]));
    }

    #[test]
    fn test_classify_power_rejects_garbage() {
        let err = InboundMessage::from_payload("POWER,12,x,40").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidValue {
                field: "POWER".to_string(),
                value: "x".to_string()
            }
        );
    }

    #[test]
    fn test_classify_status() {
        let inbound = InboundMessage::from_payload("STATUS,ROOF=OPENING,LIMIT=0").unwrap();
        let InboundMessage::Status(line) = inbound else {
            panic!("Expected Status variant");
        };
        assert_eq!(line.raw(), "ROOF=OPENING,LIMIT=0");
        assert_eq!(line.get("LIMIT"), Some("0"));
        assert_eq!(line.roof(), Some(RoofStatus::Opening));
        assert_eq!(line.fields().len(), 2);
    }

    #[test]
    fn test_status_without_roof_key() {
        let line = StatusLine::parse("SPEED=80");
        assert_eq!(line.roof(), None);
    }

    #[test]
    fn test_status_bare_key() {
        let line = StatusLine::parse("ROOF=OPEN,ESTOP");
        assert_eq!(line.get("ESTOP"), Some(""));
    }

    #[test]
    fn test_classify_log_keeps_commas() {
        let inbound = InboundMessage::from_payload("LOG,limit switch, upper").unwrap();
        assert_eq!(inbound, InboundMessage::Log("limit switch, upper".to_string()));
    }

    #[test]
    fn test_classify_unknown() {
        let inbound = InboundMessage::from_payload("TEMP,21").unwrap();
        assert!(matches!(inbound, InboundMessage::Unknown(ref m) if m.command == "TEMP"));
    }

    #[test]
    fn test_roof_status_round_trip_text() {
        for text in ["STOPPED", "OPENING", "OPEN", "CLOSING", "CLOSED", "ERROR", "STOPPING"] {
            let status: RoofStatus = text.parse().unwrap();
            assert_eq!(status.as_str(), text);
        }
        assert_eq!(
            "STOPPING".parse::<RoofStatus>().unwrap(),
            RoofStatus::Other("STOPPING".to_string())
        );
        assert!(RoofStatus::Closing.is_in_progress());
        assert!(!RoofStatus::Closed.is_in_progress());
    }
}
