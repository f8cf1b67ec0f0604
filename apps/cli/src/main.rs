//! # Koma CLI
//!
//! 天文台屋顶控制器命令行工具。
//!
//! ## 双模式架构
//!
//! ### One-shot 模式（脚本 / 排障）
//!
//! ```bash
//! # 配置默认连接
//! koma-cli config set --transport tcp --address 192.168.1.50:4001
//!
//! # 直接驱动电机（不经过仲裁）
//! koma-cli motor stop
//! koma-cli motor speed 2
//!
//! # 查看仲裁记录
//! koma-cli state --user alice
//! ```
//!
//! ### REPL 模式（多用户仲裁）
//!
//! ```bash
//! $ koma-cli shell --serial /dev/ttyUSB0
//! koma> open alice
//! koma> open bob
//! koma> close alice
//! koma> phase
//! koma> exit
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod modes;

use commands::{ConfigCommand, MotorCommand, StateCommand};
use config::{ConnectArgs, StoreArgs};
use modes::repl::run_repl;

/// Koma CLI - 屋顶控制器命令行工具
#[derive(Parser, Debug)]
#[command(name = "koma-cli")]
#[command(about = "Command-line interface for the observatory roof controller", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 直接发送电机命令
    Motor(MotorCommand),

    /// 查看仲裁记录
    State(StateCommand),

    /// 启动交互式 Shell（REPL 模式）
    Shell {
        #[command(flatten)]
        connect: ConnectArgs,

        #[command(flatten)]
        store: StoreArgs,
    },
}

fn main() -> Result<()> {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "koma_cli=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(),
        Commands::Motor(cmd) => cmd.execute(),
        Commands::State(cmd) => cmd.execute(),
        Commands::Shell { connect, store } => run_repl(connect, store),
    }
}
