//! 查看仲裁记录（只读，不连接电机）

use crate::config::{CliConfig, StoreArgs, resolve_store};
use anyhow::{Context, Result};
use clap::Args;
use koma_sdk::roof::{RoofPhase, RoofState, RoofStore};

/// `koma-cli state`
#[derive(Args, Debug)]
pub struct StateCommand {
    #[command(flatten)]
    pub store: StoreArgs,

    /// 只显示该用户视角
    #[arg(long)]
    pub user: Option<String>,
}

impl StateCommand {
    pub fn execute(self) -> Result<()> {
        let config = CliConfig::load()?;
        let (store, key) = resolve_store(&config, &self.store)?;
        let state = load_state(&store, &key)?;

        match self.user {
            Some(user) => {
                println!("{}", serde_json::to_string_pretty(&state.view(&user))?);
            },
            None => {
                println!("{}", serde_json::to_string_pretty(&state)?);
                // 故障锁存只存在于运行中的服务内
                println!("phase: {}", RoofPhase::derive(&state, false));
            },
        }
        Ok(())
    }
}

/// 读取记录，不存在时为空记录
pub fn load_state(store: &impl RoofStore, key: &str) -> Result<RoofState> {
    match store.get(key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("仲裁记录 {:?} 已损坏", key)),
        None => Ok(RoofState::default()),
    }
}
