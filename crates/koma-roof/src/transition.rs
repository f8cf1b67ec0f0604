//! 仲裁状态转移（纯函数）
//!
//! 每个函数只修改内存中的 [`RoofState`]，返回需要发出的物理动作。
//! 读写存储、发命令、加锁都由 [`RoofArbiter`](crate::RoofArbiter) 负责。
//!
//! 安全约束：
//! - `closing` 为 true 时不发 OPEN，`opening` 为 true 时不发 CLOSE（不中途反向）
//! - 对应标志已为 true 时不重复发命令

use crate::state::RoofState;
use koma_protocol::RoofStatus;

/// 需要发出的物理动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorMove {
    Open,
    Close,
}

/// 用户请求开顶
///
/// 关顶过程中的请求进入等待队列，`CLOSED`/`STOPPED` 确认后统一开顶。
pub fn request_open(state: &mut RoofState, user: &str) -> Option<MotorMove> {
    let holds = state.users.get(user).copied().unwrap_or(false);

    if state.closing {
        if !holds {
            state.add_pending(user);
        }
        return None;
    }

    if state.any_open() {
        // 已有人持有开顶，直接授予
        state.remove_pending(user);
        state.users.insert(user.to_string(), true);
        return None;
    }

    state.add_pending(user);
    if state.opening {
        None
    } else {
        state.opening = true;
        Some(MotorMove::Open)
    }
}

/// 用户请求关顶
///
/// 最后一个持有者离开时关顶；开顶过程中的关顶推迟到 `OPEN` 确认之后。
/// 屋顶已静止关闭（无持有者、无等待者、无动作）时只记录该用户，不发命令；
/// 开顶被中断后仍有等待者时也不关顶。
pub fn request_close(state: &mut RoofState, user: &str) -> Option<MotorMove> {
    let at_rest = is_at_rest_closed(state);
    state.remove_pending(user);
    state.users.insert(user.to_string(), false);

    if at_rest
        || state.any_open()
        || !state.open_requested_by.is_empty()
        || state.closing
        || state.opening
    {
        return None;
    }

    state.closing = true;
    Some(MotorMove::Close)
}

fn is_at_rest_closed(state: &RoofState) -> bool {
    !state.opening && !state.closing && !state.any_open() && state.open_requested_by.is_empty()
}

/// 电机上报 ROOF 变化
pub fn apply_status(state: &mut RoofState, status: &RoofStatus) -> Option<MotorMove> {
    match status {
        RoofStatus::Open => {
            let was_opening = state.opening;
            state.opening = false;
            for user in std::mem::take(&mut state.open_requested_by) {
                state.users.insert(user, true);
            }

            // 开顶途中所有人都已离开
            if was_opening && !state.any_open() && !state.closing {
                state.closing = true;
                return Some(MotorMove::Close);
            }
            None
        },
        RoofStatus::Closed | RoofStatus::Stopped if state.opening => {
            // 开顶被中断：不授予等待者
            state.opening = false;
            if matches!(status, RoofStatus::Closed) {
                state.open_requested_by.clear();
                return None;
            }

            // 停在半开位置且已无人需要
            if state.open_requested_by.is_empty() && !state.any_open() {
                state.closing = true;
                return Some(MotorMove::Close);
            }
            None
        },
        RoofStatus::Closed | RoofStatus::Stopped => {
            let was_closing = state.closing;
            state.closing = false;

            // 关顶途中有人请求开顶
            if was_closing && !state.open_requested_by.is_empty() && !state.opening {
                state.opening = true;
                return Some(MotorMove::Open);
            }
            None
        },
        RoofStatus::Error => {
            state.opening = false;
            state.closing = false;
            None
        },
        RoofStatus::Opening | RoofStatus::Closing | RoofStatus::Other(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn users(state: &RoofState) -> Vec<(&str, bool)> {
        state.users.iter().map(|(u, &o)| (u.as_str(), o)).collect()
    }

    #[test]
    fn test_first_open_request_moves_roof() {
        let mut state = RoofState::default();
        assert_eq!(request_open(&mut state, "A"), Some(MotorMove::Open));
        assert!(state.opening);
        assert_eq!(state.open_requested_by, vec!["A"]);

        assert_eq!(request_open(&mut state, "B"), None);
        assert_eq!(request_open(&mut state, "B"), None);
        assert_eq!(state.open_requested_by, vec!["A", "B"]);
    }

    #[test]
    fn test_open_confirmation_grants_pending() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");
        request_open(&mut state, "B");

        assert_eq!(apply_status(&mut state, &RoofStatus::Open), None);
        assert!(!state.opening);
        assert!(state.open_requested_by.is_empty());
        assert_eq!(users(&state), vec![("A", true), ("B", true)]);
    }

    #[test]
    fn test_join_open_roof_without_move() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");
        apply_status(&mut state, &RoofStatus::Open);

        assert_eq!(request_open(&mut state, "C"), None);
        assert_eq!(state.users.get("C"), Some(&true));
        assert!(state.open_requested_by.is_empty());
    }

    #[test]
    fn test_last_holder_closes() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");
        request_open(&mut state, "B");
        apply_status(&mut state, &RoofStatus::Open);

        assert_eq!(request_close(&mut state, "A"), None);
        assert_eq!(users(&state), vec![("A", false), ("B", true)]);

        assert_eq!(request_close(&mut state, "B"), Some(MotorMove::Close));
        assert!(state.closing);

        // 重复关顶不重复发命令
        assert_eq!(request_close(&mut state, "B"), None);

        assert_eq!(apply_status(&mut state, &RoofStatus::Closed), None);
        assert!(!state.closing);
    }

    #[test]
    fn test_open_during_closing_is_deferred() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");
        apply_status(&mut state, &RoofStatus::Open);
        request_close(&mut state, "A");
        assert!(state.closing);

        assert_eq!(request_open(&mut state, "B"), None);
        assert!(!state.opening);
        assert_eq!(state.open_requested_by, vec!["B"]);

        assert_eq!(apply_status(&mut state, &RoofStatus::Closing), None);
        assert_eq!(apply_status(&mut state, &RoofStatus::Closed), Some(MotorMove::Open));
        assert!(state.opening && !state.closing);

        apply_status(&mut state, &RoofStatus::Open);
        assert_eq!(state.users.get("B"), Some(&true));
    }

    #[test]
    fn test_close_during_opening_is_deferred() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");

        assert_eq!(request_close(&mut state, "A"), None);
        assert!(state.opening && !state.closing);
        assert!(state.open_requested_by.is_empty());

        assert_eq!(apply_status(&mut state, &RoofStatus::Open), Some(MotorMove::Close));
        assert!(!state.opening && state.closing);
        assert_eq!(state.users.get("A"), Some(&false));
    }

    #[test]
    fn test_stop_during_opening_keeps_requesters() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");

        assert_eq!(apply_status(&mut state, &RoofStatus::Stopped), None);
        assert!(!state.opening && !state.closing);
        assert_eq!(state.open_requested_by, vec!["A"]);
        assert!(state.users.is_empty());

        // 停在半开位置，最后一个请求者放弃后关顶
        assert_eq!(request_close(&mut state, "A"), Some(MotorMove::Close));
        assert!(state.closing);
    }

    #[test]
    fn test_stop_during_opening_can_reopen() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");
        apply_status(&mut state, &RoofStatus::Stopped);

        assert_eq!(request_open(&mut state, "A"), Some(MotorMove::Open));
        assert!(state.opening);
        assert_eq!(state.open_requested_by, vec!["A"]);
    }

    #[test]
    fn test_stop_during_opening_waits_for_last_requester() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");
        request_open(&mut state, "B");
        apply_status(&mut state, &RoofStatus::Stopped);

        assert_eq!(request_close(&mut state, "A"), None);
        assert_eq!(state.open_requested_by, vec!["B"]);
        assert_eq!(request_close(&mut state, "B"), Some(MotorMove::Close));
    }

    #[test]
    fn test_stop_after_deferred_close_closes() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");
        request_close(&mut state, "A");
        assert!(state.opening);

        assert_eq!(apply_status(&mut state, &RoofStatus::Stopped), Some(MotorMove::Close));
        assert!(!state.opening && state.closing);

        assert_eq!(apply_status(&mut state, &RoofStatus::Closed), None);
        assert!(!state.closing);
    }

    #[test]
    fn test_closed_during_opening_drops_requests() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");
        request_open(&mut state, "B");

        assert_eq!(apply_status(&mut state, &RoofStatus::Closed), None);
        assert!(!state.opening && !state.closing);
        assert!(state.open_requested_by.is_empty());
        assert!(state.users.is_empty());

        assert_eq!(request_open(&mut state, "B"), Some(MotorMove::Open));
    }

    #[test]
    fn test_close_at_rest_only_records_user() {
        let mut state = RoofState::default();
        assert_eq!(request_close(&mut state, "A"), None);
        assert!(!state.closing);
        assert_eq!(state.users.get("A"), Some(&false));

        assert_eq!(request_open(&mut state, "B"), Some(MotorMove::Open));
    }

    #[test]
    fn test_unsolicited_open_does_not_close() {
        let mut state = RoofState::default();
        assert_eq!(apply_status(&mut state, &RoofStatus::Open), None);
        assert!(!state.closing);
    }

    #[test]
    fn test_error_clears_flags_only() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");
        request_open(&mut state, "B");

        assert_eq!(apply_status(&mut state, &RoofStatus::Error), None);
        assert!(!state.opening && !state.closing);
        assert_eq!(state.open_requested_by, vec!["A", "B"]);
        assert!(state.users.is_empty());

        // 故障后的 CLOSED 不会补发开顶
        assert_eq!(apply_status(&mut state, &RoofStatus::Closed), None);
        assert!(!state.opening);
    }

    #[test]
    fn test_unknown_status_ignored() {
        let mut state = RoofState::default();
        request_open(&mut state, "A");
        let before = state.clone();
        assert_eq!(apply_status(&mut state, &RoofStatus::Other("STOPPING".into())), None);
        assert_eq!(state, before);
    }

    #[derive(Debug, Clone)]
    enum Event {
        Open(u8),
        Close(u8),
        Status(RoofStatus),
    }

    fn event() -> impl Strategy<Value = Event> {
        prop_oneof![
            (0u8..4).prop_map(Event::Open),
            (0u8..4).prop_map(Event::Close),
            prop_oneof![
                Just(RoofStatus::Open),
                Just(RoofStatus::Opening),
                Just(RoofStatus::Closing),
                Just(RoofStatus::Closed),
                Just(RoofStatus::Stopped),
            ]
            .prop_map(Event::Status),
        ]
    }

    proptest! {
        /// 任意事件序列下不变量成立，且从不在反向移动中发命令
        #[test]
        fn never_reverses_mid_move(events in proptest::collection::vec(event(), 0..64)) {
            let mut state = RoofState::default();
            for event in events {
                let before = state.clone();
                let mv = match &event {
                    Event::Open(u) => request_open(&mut state, &format!("u{}", u)),
                    Event::Close(u) => request_close(&mut state, &format!("u{}", u)),
                    Event::Status(s) => apply_status(&mut state, s),
                };
                match mv {
                    Some(MotorMove::Open) => {
                        prop_assert!(!before.opening);
                        prop_assert!(!state.closing);
                    },
                    Some(MotorMove::Close) => {
                        prop_assert!(!before.closing);
                        prop_assert!(!state.opening);
                    },
                    None => {},
                }
                prop_assert!(state.is_consistent(), "{:?} -> {:?}", event, state);
            }
        }

        /// 电机停下后仲裁不会卡住：新用户总能开顶
        #[test]
        fn stop_never_wedges(events in proptest::collection::vec(event(), 0..64)) {
            let mut state = RoofState::default();
            for event in events {
                match &event {
                    Event::Open(u) => request_open(&mut state, &format!("u{}", u)),
                    Event::Close(u) => request_close(&mut state, &format!("u{}", u)),
                    Event::Status(s) => apply_status(&mut state, s),
                };
            }

            match apply_status(&mut state, &RoofStatus::Stopped) {
                Some(MotorMove::Open) => prop_assert!(state.opening),
                Some(MotorMove::Close) => {
                    prop_assert!(state.closing);
                    prop_assert_eq!(apply_status(&mut state, &RoofStatus::Closed), None);
                },
                None => {},
            }

            if !state.opening {
                prop_assert!(!state.closing);
                let mv = request_open(&mut state, "fresh");
                prop_assert!(
                    mv == Some(MotorMove::Open) || state.users.get("fresh") == Some(&true),
                    "{:?}",
                    state
                );
            }
            prop_assert!(state.is_consistent());
        }
    }
}
