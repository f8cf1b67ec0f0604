//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 安装全局 tracing 订阅器
///
/// - 过滤规则取自 `RUST_LOG`，未设置时为 `info`
/// - `log` crate 的记录经 `tracing-log` 转发
///
/// 可重复调用，已安装时什么也不做。
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    // fmt 订阅器通常已装好转发器，此时返回错误
    let _ = tracing_log::LogTracer::init();
}
