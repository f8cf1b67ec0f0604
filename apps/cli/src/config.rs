//! CLI 配置文件
//!
//! `<config_dir>/koma/config.toml`：
//!
//! ```toml
//! [link]
//! transport = "tcp"
//! address = "192.168.1.50:4001"
//! baud_rate = 57600
//!
//! [store]
//! directory = "/var/lib/koma"
//! key = "roof-state"
//! ```

use anyhow::{Context, Result};
use clap::Args;
use koma_sdk::driver::{DEFAULT_BAUD_RATE, LinkTarget, MotorLinkBuilder};
use koma_sdk::roof::{DEFAULT_ROOF_KEY, FileStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件路径
pub fn config_file() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("koma");
    path.push("config.toml");
    Ok(path)
}

/// 传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Serial,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSection {
    pub transport: Option<Transport>,
    /// TCP 串口服务器地址
    pub address: Option<String>,
    /// 串口设备
    pub device: Option<String>,
    pub baud_rate: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    /// 仲裁记录目录
    pub directory: Option<PathBuf>,
    /// 记录键
    pub key: Option<String>,
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub store: StoreSection,
}

impl CliConfig {
    /// 加载默认位置的配置（不存在时返回默认值）
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = config_file()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("创建配置目录失败")?;
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, format!("# Koma CLI Configuration\n\n{}", content))
            .with_context(|| format!("写入配置文件失败: {}", path.display()))
    }
}

/// 连接参数（覆盖配置文件）
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// TCP 串口服务器地址（host:port）
    #[arg(long, conflicts_with = "serial")]
    pub tcp: Option<String>,

    /// 串口设备（如 /dev/ttyUSB0）
    #[arg(long)]
    pub serial: Option<String>,

    /// 串口波特率
    #[arg(long)]
    pub baud: Option<u32>,
}

/// 存储参数（覆盖配置文件）
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// 仲裁记录目录
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// 记录键
    #[arg(long)]
    pub key: Option<String>,
}

/// 合并后的连接目标
pub fn resolve_target(config: &CliConfig, args: &ConnectArgs) -> Result<(LinkTarget, u32)> {
    let baud_rate = args.baud.or(config.link.baud_rate).unwrap_or(DEFAULT_BAUD_RATE);

    if let Some(addr) = &args.tcp {
        return Ok((LinkTarget::Tcp(addr.clone()), baud_rate));
    }
    if let Some(device) = &args.serial {
        return Ok((LinkTarget::Serial(device.clone()), baud_rate));
    }

    let transport = config.link.transport.or_else(|| {
        // 未指定时按已填的字段推断
        match (&config.link.address, &config.link.device) {
            (Some(_), None) => Some(Transport::Tcp),
            (None, Some(_)) => Some(Transport::Serial),
            _ => None,
        }
    });

    match transport {
        Some(Transport::Tcp) => {
            let addr = config
                .link
                .address
                .clone()
                .ok_or_else(|| anyhow::anyhow!("配置中缺少 link.address"))?;
            Ok((LinkTarget::Tcp(addr), baud_rate))
        },
        Some(Transport::Serial) => {
            let device = config
                .link
                .device
                .clone()
                .ok_or_else(|| anyhow::anyhow!("配置中缺少 link.device"))?;
            Ok((LinkTarget::Serial(device), baud_rate))
        },
        None => anyhow::bail!(
            "未指定连接方式：使用 --tcp / --serial，或 `koma-cli config set --transport ...`"
        ),
    }
}

/// 按合并后的配置创建 builder
pub fn link_builder(config: &CliConfig, args: &ConnectArgs) -> Result<MotorLinkBuilder> {
    let (target, baud_rate) = resolve_target(config, args)?;
    Ok(MotorLinkBuilder::new().target(target).baud_rate(baud_rate))
}

/// 合并后的存储位置
pub fn resolve_store(config: &CliConfig, args: &StoreArgs) -> Result<(FileStore, String)> {
    let directory = match args.store_dir.clone().or_else(|| config.store.directory.clone()) {
        Some(dir) => dir,
        None => {
            let mut dir = dirs::data_dir().ok_or_else(|| anyhow::anyhow!("无法确定数据目录"))?;
            dir.push("koma");
            dir
        },
    };
    let key = args
        .key
        .clone()
        .or_else(|| config.store.key.clone())
        .unwrap_or_else(|| DEFAULT_ROOF_KEY.to_string());
    Ok((FileStore::new(directory), key))
}
