//! 屋顶仲裁记录与派生视图

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 持久化的仲裁记录
///
/// 序列化形状固定为：
///
/// ```json
/// { "opening": false, "closing": false, "openRequestedBy": [], "users": {} }
/// ```
///
/// 不变量：
/// - `opening` 与 `closing` 不会同时为 true
/// - 出现在 `open_requested_by` 里的用户，`users` 中对应项为 false 或不存在
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoofState {
    /// 已发出 OPEN，等待 `ROOF=OPEN` 确认
    pub opening: bool,
    /// 已发出 CLOSE，等待 `ROOF=CLOSED` / `ROOF=STOPPED` 确认
    pub closing: bool,
    /// 等待开顶确认的用户（有序，无重复）
    pub open_requested_by: Vec<String>,
    /// 用户 → 是否持有开顶
    pub users: BTreeMap<String, bool>,
}

impl RoofState {
    /// 是否有用户持有开顶
    pub fn any_open(&self) -> bool {
        self.users.values().any(|&open| open)
    }

    /// 持有开顶的用户
    pub fn holders(&self) -> impl Iterator<Item = &str> {
        self.users
            .iter()
            .filter(|&(_, &open)| open)
            .map(|(user, _)| user.as_str())
    }

    pub fn is_pending(&self, user: &str) -> bool {
        self.open_requested_by.iter().any(|u| u == user)
    }

    /// 加入等待队列（已在队列中则不动）
    pub fn add_pending(&mut self, user: &str) {
        if !self.is_pending(user) {
            self.open_requested_by.push(user.to_string());
        }
    }

    pub fn remove_pending(&mut self, user: &str) {
        self.open_requested_by.retain(|u| u != user);
    }

    /// 记录是否满足不变量
    pub fn is_consistent(&self) -> bool {
        !(self.opening && self.closing)
            && self
                .open_requested_by
                .iter()
                .all(|u| !self.users.get(u).copied().unwrap_or(false))
    }

    /// 某个用户看到的屋顶状态
    pub fn view(&self, user: &str) -> RoofView {
        RoofView {
            open: self.users.get(user).copied(),
            opening: self.opening,
            closing: self.closing,
        }
    }
}

/// 展示层渲染的单用户视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RoofView {
    /// 该用户是否持有开顶；从未操作过为 `None`
    pub open: Option<bool>,
    pub opening: bool,
    pub closing: bool,
}

/// 逻辑屋顶状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoofPhase {
    Stopped,
    Opening,
    Open,
    Closing,
    /// 电机故障，需人工复位
    Error,
}

impl RoofPhase {
    /// 由记录与故障锁存推导
    pub fn derive(state: &RoofState, faulted: bool) -> Self {
        if faulted {
            RoofPhase::Error
        } else if state.opening {
            RoofPhase::Opening
        } else if state.closing {
            RoofPhase::Closing
        } else if state.any_open() {
            RoofPhase::Open
        } else {
            RoofPhase::Stopped
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoofPhase::Stopped => "STOPPED",
            RoofPhase::Opening => "OPENING",
            RoofPhase::Open => "OPEN",
            RoofPhase::Closing => "CLOSING",
            RoofPhase::Error => "ERROR",
        }
    }
}

impl fmt::Display for RoofPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
