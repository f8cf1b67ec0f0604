//! RoofArbiter：多用户开关顶仲裁
//!
//! 每个操作都是一次事务：加锁 → 从存储读记录 → 状态转移 → 写回 → 下发物理命令。
//! 用户请求与状态事件共用同一把锁，读改写不会交错。

use crate::error::RoofError;
use crate::motor::RoofMotor;
use crate::state::{RoofPhase, RoofState, RoofView};
use crate::store::RoofStore;
use crate::transition::{self, MotorMove};
use crossbeam_channel::Receiver;
use koma_protocol::RoofStatus;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// 默认记录键
pub const DEFAULT_ROOF_KEY: &str = "roof-state";

/// 锁内状态
#[derive(Debug, Default)]
struct ArbiterInner {
    /// 故障锁存：收到 `ROOF=ERROR` 后置位，由 `reset_fault` 清除。
    /// 不写入记录，进程重启即视为人工复位。
    faulted: bool,
}

/// 屋顶仲裁器
pub struct RoofArbiter<S, M> {
    store: S,
    motor: M,
    key: String,
    inner: Mutex<ArbiterInner>,
}

impl<S: RoofStore, M: RoofMotor> RoofArbiter<S, M> {
    pub fn new(store: S, motor: M) -> Self {
        Self {
            store,
            motor,
            key: DEFAULT_ROOF_KEY.to_string(),
            inner: Mutex::new(ArbiterInner::default()),
        }
    }

    /// 使用自定义记录键（同一存储管理多个屋顶时）
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }

    /// 用户请求开顶，返回提交后的记录
    ///
    /// # 错误
    /// - `RoofError::InvalidUser`: 用户 ID 为空
    /// - `RoofError::Faulted`: 故障锁存中
    /// - `RoofError::Store` / `RoofError::Corrupt`: 记录读写失败
    /// - `RoofError::Motor`: OPEN 无法下发（记录已回滚）
    pub fn request_open(&self, user: &str) -> Result<RoofState, RoofError> {
        validate_user(user)?;
        let inner = self.inner.lock();
        if inner.faulted {
            return Err(RoofError::Faulted);
        }
        self.transact(|state| transition::request_open(state, user))
    }

    /// 用户请求关顶，返回提交后的记录
    pub fn request_close(&self, user: &str) -> Result<RoofState, RoofError> {
        validate_user(user)?;
        let inner = self.inner.lock();
        if inner.faulted {
            return Err(RoofError::Faulted);
        }
        self.transact(|state| transition::request_close(state, user))
    }

    /// 处理电机上报的 ROOF 变化
    pub fn on_roof_status_changed(&self, status: &RoofStatus) -> Result<(), RoofError> {
        let mut inner = self.inner.lock();

        match status {
            RoofStatus::Error => {
                if !inner.faulted {
                    error!("Roof motor reported ERROR; arbitration halted until reset");
                }
                inner.faulted = true;
            },
            _ if inner.faulted => {
                debug!("Ignoring roof status {} while faulted", status);
                return Ok(());
            },
            RoofStatus::Opening | RoofStatus::Closing => {
                debug!("Roof {}", status);
                return Ok(());
            },
            RoofStatus::Other(value) => {
                warn!("Ignoring unrecognised roof status {:?}", value);
                return Ok(());
            },
            _ => info!("Roof {}", status),
        }

        self.transact(|state| transition::apply_status(state, status))
            .map(|_| ())
    }

    /// 当前记录
    pub fn snapshot(&self) -> Result<RoofState, RoofError> {
        let _inner = self.inner.lock();
        self.load()
    }

    /// 某个用户看到的屋顶状态
    pub fn view(&self, user: &str) -> Result<RoofView, RoofError> {
        Ok(self.snapshot()?.view(user))
    }

    /// 逻辑屋顶状态
    pub fn phase(&self) -> Result<RoofPhase, RoofError> {
        let inner = self.inner.lock();
        let state = self.load()?;
        Ok(RoofPhase::derive(&state, inner.faulted))
    }

    pub fn is_faulted(&self) -> bool {
        self.inner.lock().faulted
    }

    /// 人工复位故障锁存（不会补发任何命令）
    pub fn reset_fault(&self) {
        let mut inner = self.inner.lock();
        if inner.faulted {
            info!("Roof fault cleared by operator");
        }
        inner.faulted = false;
    }

    /// 调用方必须持有 `inner` 锁
    fn transact<F>(&self, mutate: F) -> Result<RoofState, RoofError>
    where
        F: FnOnce(&mut RoofState) -> Option<MotorMove>,
    {
        let before = self.load()?;
        let mut after = before.clone();
        let mv = mutate(&mut after);
        let changed = after != before;

        if changed {
            self.save(&after)?;
        }

        if let Some(mv) = mv
            && let Err(e) = self.issue(mv)
        {
            if changed && let Err(restore) = self.save(&before) {
                error!("Failed to restore roof record after motor error: {}", restore);
            }
            return Err(e);
        }

        Ok(after)
    }

    fn issue(&self, mv: MotorMove) -> Result<(), RoofError> {
        match mv {
            MotorMove::Open => {
                info!("Opening physical roof");
                self.motor.open()?;
            },
            MotorMove::Close => {
                info!("Closing physical roof");
                self.motor.close()?;
            },
        }
        Ok(())
    }

    fn load(&self) -> Result<RoofState, RoofError> {
        match self.store.get(&self.key)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(RoofState::default()),
        }
    }

    fn save(&self, state: &RoofState) -> Result<(), RoofError> {
        let bytes = serde_json::to_vec(state)?;
        self.store.set(&self.key, &bytes)?;
        Ok(())
    }
}

impl<S, M> RoofArbiter<S, M>
where
    S: RoofStore + 'static,
    M: RoofMotor + 'static,
{
    /// 启动状态泵线程：按顺序消费 ROOF 事件
    ///
    /// 事件流断开（链路停止）时线程退出。
    pub fn spawn_status_pump(
        self: &Arc<Self>,
        events: Receiver<RoofStatus>,
    ) -> std::io::Result<JoinHandle<()>> {
        let arbiter = Arc::clone(self);
        std::thread::Builder::new()
            .name("koma-roof-pump".into())
            .spawn(move || {
                for status in events.iter() {
                    if let Err(e) = arbiter.on_roof_status_changed(&status) {
                        error!("Failed to apply roof status {}: {}", status, e);
                    }
                }
                info!("Roof status stream ended");
            })
    }
}

fn validate_user(user: &str) -> Result<(), RoofError> {
    if user.trim().is_empty() {
        return Err(RoofError::InvalidUser(user.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use koma_driver::DriverError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingMotor {
        opens: AtomicUsize,
        closes: AtomicUsize,
        fail: AtomicBool,
    }

    impl RecordingMotor {
        fn counts(&self) -> (usize, usize) {
            (self.opens.load(Ordering::SeqCst), self.closes.load(Ordering::SeqCst))
        }
    }

    impl RoofMotor for RecordingMotor {
        fn open(&self) -> Result<(), DriverError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DriverError::ChannelFull);
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) -> Result<(), DriverError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DriverError::LinkDown("Stream closed by peer".into()));
            }
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 可注入故障、统计写入次数的存储
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_get: AtomicBool,
        fail_set: AtomicBool,
        sets: AtomicUsize,
    }

    impl RoofStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("get unavailable".into()));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
            if self.fail_set.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("set unavailable".into()));
            }
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }
    }

    type TestArbiter = RoofArbiter<Arc<FlakyStore>, Arc<RecordingMotor>>;

    fn arbiter() -> (TestArbiter, Arc<FlakyStore>, Arc<RecordingMotor>) {
        let store = Arc::new(FlakyStore::default());
        let motor = Arc::new(RecordingMotor::default());
        (RoofArbiter::new(store.clone(), motor.clone()), store, motor)
    }

    fn users(state: &RoofState) -> Vec<(String, bool)> {
        state.users.iter().map(|(u, &o)| (u.clone(), o)).collect()
    }

    #[test]
    fn test_shared_open_and_last_close() {
        let (arbiter, _store, motor) = arbiter();

        let state = arbiter.request_open("A").unwrap();
        assert!(state.opening);
        assert_eq!(state.open_requested_by, vec!["A"]);
        assert_eq!(motor.counts(), (1, 0));

        let state = arbiter.request_open("B").unwrap();
        assert_eq!(state.open_requested_by, vec!["A", "B"]);
        assert_eq!(motor.counts(), (1, 0));

        arbiter.on_roof_status_changed(&RoofStatus::Open).unwrap();
        let state = arbiter.snapshot().unwrap();
        assert!(!state.opening);
        assert!(state.open_requested_by.is_empty());
        assert_eq!(users(&state), vec![("A".into(), true), ("B".into(), true)]);

        let state = arbiter.request_close("A").unwrap();
        assert_eq!(users(&state), vec![("A".into(), false), ("B".into(), true)]);
        assert_eq!(motor.counts(), (1, 0));

        let state = arbiter.request_close("B").unwrap();
        assert!(state.closing);
        assert_eq!(motor.counts(), (1, 1));

        arbiter.on_roof_status_changed(&RoofStatus::Closed).unwrap();
        assert_eq!(arbiter.phase().unwrap(), RoofPhase::Stopped);
    }

    #[test]
    fn test_record_survives_new_arbiter() {
        let (arbiter, store, motor) = arbiter();
        arbiter.request_open("A").unwrap();
        arbiter.on_roof_status_changed(&RoofStatus::Open).unwrap();
        drop(arbiter);

        let restarted = RoofArbiter::new(store, motor);
        assert_eq!(restarted.view("A").unwrap().open, Some(true));
        assert_eq!(restarted.phase().unwrap(), RoofPhase::Open);
    }

    #[test]
    fn test_record_json_shape() {
        let (arbiter, store, _motor) = arbiter();
        arbiter.request_open("A").unwrap();

        let raw = store.get(DEFAULT_ROOF_KEY).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "opening": true,
                "closing": false,
                "openRequestedBy": ["A"],
                "users": {}
            })
        );
    }

    #[test]
    fn test_custom_key() {
        let store = Arc::new(MemoryStore::new());
        let motor = Arc::new(RecordingMotor::default());
        let arbiter = RoofArbiter::new(store.clone(), motor).with_key("north-roof");
        arbiter.request_open("A").unwrap();

        assert_eq!(arbiter.key(), "north-roof");
        assert!(store.get("north-roof").unwrap().is_some());
        assert!(store.get(DEFAULT_ROOF_KEY).unwrap().is_none());
    }

    #[test]
    fn test_persist_only_on_change() {
        let (arbiter, store, _motor) = arbiter();
        arbiter.request_open("A").unwrap();
        assert_eq!(store.sets.load(Ordering::SeqCst), 1);

        // 重复请求不改变记录
        arbiter.request_open("A").unwrap();
        arbiter.on_roof_status_changed(&RoofStatus::Opening).unwrap();
        assert_eq!(store.sets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_store_failure_leaves_no_mutation() {
        let (arbiter, store, motor) = arbiter();
        arbiter.request_open("A").unwrap();

        store.fail_set.store(true, Ordering::SeqCst);
        assert!(matches!(arbiter.request_close("A"), Err(RoofError::Store(_))));
        assert_eq!(motor.counts(), (1, 0));

        store.fail_set.store(false, Ordering::SeqCst);
        let state = arbiter.snapshot().unwrap();
        assert!(state.opening && state.users.is_empty());

        store.fail_get.store(true, Ordering::SeqCst);
        assert!(matches!(arbiter.request_open("B"), Err(RoofError::Store(_))));
        assert!(matches!(arbiter.phase(), Err(RoofError::Store(_))));
    }

    #[test]
    fn test_motor_failure_rolls_back() {
        let (arbiter, _store, motor) = arbiter();
        motor.fail.store(true, Ordering::SeqCst);

        assert!(matches!(
            arbiter.request_open("A"),
            Err(RoofError::Motor(DriverError::ChannelFull))
        ));
        assert_eq!(arbiter.snapshot().unwrap(), RoofState::default());

        motor.fail.store(false, Ordering::SeqCst);
        assert!(arbiter.request_open("A").unwrap().opening);
        assert_eq!(motor.counts(), (1, 0));
    }

    #[test]
    fn test_corrupt_record() {
        let (arbiter, store, _motor) = arbiter();
        store.set(DEFAULT_ROOF_KEY, b"not json").unwrap();
        assert!(matches!(arbiter.request_open("A"), Err(RoofError::Corrupt(_))));
    }

    #[test]
    fn test_invalid_user() {
        let (arbiter, _store, motor) = arbiter();
        assert!(matches!(arbiter.request_open(""), Err(RoofError::InvalidUser(_))));
        assert!(matches!(arbiter.request_close("  "), Err(RoofError::InvalidUser(_))));
        assert_eq!(motor.counts(), (0, 0));
    }

    #[test]
    fn test_fault_latch() {
        let (arbiter, _store, motor) = arbiter();
        arbiter.request_open("A").unwrap();

        arbiter.on_roof_status_changed(&RoofStatus::Error).unwrap();
        assert!(arbiter.is_faulted());
        assert_eq!(arbiter.phase().unwrap(), RoofPhase::Error);
        let state = arbiter.snapshot().unwrap();
        assert!(!state.opening && !state.closing);

        assert!(matches!(arbiter.request_open("B"), Err(RoofError::Faulted)));
        assert!(matches!(arbiter.request_close("A"), Err(RoofError::Faulted)));

        // 锁存期间其它事件被忽略
        arbiter.on_roof_status_changed(&RoofStatus::Open).unwrap();
        assert!(arbiter.snapshot().unwrap().users.is_empty());

        arbiter.reset_fault();
        assert!(!arbiter.is_faulted());
        assert_eq!(motor.counts(), (1, 0));

        // 复位后重新请求才会动作
        arbiter.request_open("A").unwrap();
        assert_eq!(motor.counts(), (2, 0));
    }

    #[test]
    fn test_restart_clears_fault_latch() {
        let (arbiter, store, motor) = arbiter();
        arbiter.request_open("A").unwrap();
        arbiter.on_roof_status_changed(&RoofStatus::Error).unwrap();
        assert!(arbiter.is_faulted());
        drop(arbiter);

        let restarted = RoofArbiter::new(store, motor.clone());
        assert!(!restarted.is_faulted());
        assert_eq!(restarted.phase().unwrap(), RoofPhase::Stopped);
        restarted.request_open("A").unwrap();
        assert_eq!(motor.counts(), (2, 0));
    }

    #[test]
    fn test_deferred_open_after_close() {
        let (arbiter, _store, motor) = arbiter();
        arbiter.request_open("A").unwrap();
        arbiter.on_roof_status_changed(&RoofStatus::Open).unwrap();
        arbiter.request_close("A").unwrap();
        assert_eq!(motor.counts(), (1, 1));

        let state = arbiter.request_open("B").unwrap();
        assert_eq!(state.open_requested_by, vec!["B"]);
        assert_eq!(motor.counts(), (1, 1));

        arbiter.on_roof_status_changed(&RoofStatus::Closed).unwrap();
        assert_eq!(motor.counts(), (2, 1));
        assert_eq!(arbiter.phase().unwrap(), RoofPhase::Opening);
    }

    #[test]
    fn test_stop_during_opening_does_not_wedge() {
        let (arbiter, _store, motor) = arbiter();
        arbiter.request_open("A").unwrap();
        arbiter.request_open("B").unwrap();
        assert_eq!(motor.counts(), (1, 0));

        // 操作员急停，电机停在半开位置
        arbiter.on_roof_status_changed(&RoofStatus::Stopped).unwrap();
        assert_eq!(arbiter.phase().unwrap(), RoofPhase::Stopped);
        assert_eq!(arbiter.view("A").unwrap().open, None);

        arbiter.request_close("A").unwrap();
        assert_eq!(motor.counts(), (1, 0));
        let state = arbiter.request_close("B").unwrap();
        assert!(state.closing);
        assert_eq!(motor.counts(), (1, 1));

        arbiter.on_roof_status_changed(&RoofStatus::Closed).unwrap();
        arbiter.request_open("A").unwrap();
        assert_eq!(motor.counts(), (2, 1));
    }

    #[test]
    fn test_close_at_rest_sends_nothing() {
        let (arbiter, _store, motor) = arbiter();
        let state = arbiter.request_close("A").unwrap();
        assert!(!state.closing);
        assert_eq!(state.users.get("A"), Some(&false));
        assert_eq!(motor.counts(), (0, 0));

        arbiter.request_open("B").unwrap();
        assert_eq!(motor.counts(), (1, 0));
    }

    #[test]
    fn test_concurrent_requests_serialized() {
        let (arbiter, store, motor) = arbiter();
        let arbiter = Arc::new(arbiter);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let arbiter = arbiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        arbiter.request_open(&format!("user{}", i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = arbiter.snapshot().unwrap();
        assert_eq!(motor.counts(), (1, 0));
        assert_eq!(state.open_requested_by.len(), 8);
        // 首次写入之后没有任何变化
        assert_eq!(store.sets.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_status_pump_drains_events() {
        let (arbiter, _store, motor) = arbiter();
        let arbiter = Arc::new(arbiter);
        let (tx, rx) = crossbeam_channel::unbounded();
        let pump = arbiter.spawn_status_pump(rx).unwrap();

        arbiter.request_open("A").unwrap();
        arbiter.request_close("A").unwrap();
        tx.send(RoofStatus::Opening).unwrap();
        tx.send(RoofStatus::Open).unwrap();
        tx.send(RoofStatus::Closing).unwrap();
        tx.send(RoofStatus::Closed).unwrap();
        drop(tx);
        join_within(pump, Duration::from_secs(2));

        assert_eq!(motor.counts(), (1, 1));
        assert_eq!(arbiter.phase().unwrap(), RoofPhase::Stopped);
        assert_eq!(arbiter.view("A").unwrap().open, Some(false));
    }

    fn join_within(handle: JoinHandle<()>, timeout: Duration) {
        let deadline = std::time::Instant::now() + timeout;
        while !handle.is_finished() {
            assert!(std::time::Instant::now() < deadline, "status pump did not stop");
            std::thread::sleep(Duration::from_millis(5));
        }
        handle.join().unwrap();
    }
}
