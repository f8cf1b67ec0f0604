//! 配置管理命令

use crate::config::{CliConfig, Transport, config_file};
use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 传输方式
        #[arg(long, value_enum)]
        transport: Option<Transport>,

        /// TCP 串口服务器地址（host:port）
        #[arg(long)]
        address: Option<String>,

        /// 串口设备
        #[arg(long)]
        device: Option<String>,

        /// 串口波特率
        #[arg(long)]
        baud: Option<u32>,

        /// 仲裁记录目录
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// 记录键
        #[arg(long)]
        key: Option<String>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称（link / store / all）
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Set {
                transport,
                address,
                device,
                baud,
                store_dir,
                key,
            } => {
                let mut config = CliConfig::load()?;
                let changed = apply_set(
                    &mut config,
                    transport,
                    address,
                    device,
                    baud,
                    store_dir,
                    key,
                );
                if changed.is_empty() {
                    println!("⚠️  没有需要修改的配置项");
                    return Ok(());
                }
                let path = config.save()?;
                for item in changed {
                    println!("✅ 设置 {}", item);
                }
                println!("📁 {}", path.display());
                Ok(())
            },

            ConfigCommand::Get { key } => {
                let config = CliConfig::load()?;
                let text = match key.as_str() {
                    "link" => toml::to_string_pretty(&config.link)?,
                    "store" => toml::to_string_pretty(&config.store)?,
                    "all" => toml::to_string_pretty(&config)?,
                    other => anyhow::bail!("未知配置项: {}（可选 link / store / all）", other),
                };
                print!("{}", text);
                Ok(())
            },

            ConfigCommand::Check => {
                let path = config_file()?;
                println!("📁 配置文件: {}", path.display());
                if !path.exists() {
                    println!("⚠️  配置文件不存在，使用默认值");
                    return Ok(());
                }
                let config = CliConfig::load()?;
                match crate::config::resolve_target(&config, &Default::default()) {
                    Ok((target, baud)) => println!("✅ 连接目标: {} ({} baud)", target, baud),
                    Err(e) => println!("⚠️  {}", e),
                }
                let (store, key) = crate::config::resolve_store(&config, &Default::default())?;
                println!("✅ 仲裁记录: {} / {}", store.dir().display(), key);
                Ok(())
            },
        }
    }
}

/// 合并 `config set` 的参数，返回修改过的项
fn apply_set(
    config: &mut CliConfig,
    transport: Option<Transport>,
    address: Option<String>,
    device: Option<String>,
    baud: Option<u32>,
    store_dir: Option<PathBuf>,
    key: Option<String>,
) -> Vec<String> {
    let mut changed = Vec::new();

    if let Some(t) = transport {
        config.link.transport = Some(t);
        changed.push(format!("link.transport = {:?}", t));
    }
    if let Some(addr) = address {
        changed.push(format!("link.address = {}", addr));
        config.link.address = Some(addr);
    }
    if let Some(dev) = device {
        changed.push(format!("link.device = {}", dev));
        config.link.device = Some(dev);
    }
    if let Some(b) = baud {
        config.link.baud_rate = Some(b);
        changed.push(format!("link.baud_rate = {}", b));
    }
    if let Some(dir) = store_dir {
        changed.push(format!("store.directory = {}", dir.display()));
        config.store.directory = Some(dir);
    }
    if let Some(k) = key {
        changed.push(format!("store.key = {}", k));
        config.store.key = Some(k);
    }

    changed
}
