//! 电机直连命令（不经过仲裁）
//!
//! 连接 → 发送一条命令 → 断开。链路关闭前会写完队列中的命令。

use crate::config::{CliConfig, ConnectArgs, link_builder};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use koma_sdk::OutboundCommand;
use tracing::info;

/// 电机动作
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorAction {
    /// 开顶
    Open,
    /// 关顶
    Close,
    /// 停止
    Stop,
    /// 设置速度
    Speed {
        /// 速度值（原样发给控制器）
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
}

impl MotorAction {
    pub fn command(self) -> OutboundCommand {
        match self {
            MotorAction::Open => OutboundCommand::Open,
            MotorAction::Close => OutboundCommand::Close,
            MotorAction::Stop => OutboundCommand::Stop,
            MotorAction::Speed { value } => OutboundCommand::SetSpeed(value),
        }
    }
}

/// `koma-cli motor ...`
#[derive(Args, Debug)]
pub struct MotorCommand {
    #[command(flatten)]
    pub connect: ConnectArgs,

    #[command(subcommand)]
    pub action: MotorAction,
}

impl MotorCommand {
    pub fn execute(self) -> Result<()> {
        let config = CliConfig::load()?;
        let link = link_builder(&config, &self.connect)?.build().context("连接电机控制器失败")?;

        let command = self.action.command();
        info!("Sending {:?} via {}", command, link.description());
        link.send(command).context("发送命令失败")?;

        // drop 时写完队列
        drop(link);
        println!("✅ 已发送 {}", command.encode().trim_end());
        Ok(())
    }
}
