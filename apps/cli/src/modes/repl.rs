//! REPL 模式（交互式 Shell）
//!
//! 专用输入线程 + crossbeam 通道：rustyline 在输入线程内阻塞读取，
//! 主线程持有 `RoofService` 并逐条执行命令。

use crate::config::{CliConfig, ConnectArgs, StoreArgs, link_builder, resolve_store};
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded};
use koma_sdk::RoofService;
use koma_sdk::driver::LinkHealth;
use koma_sdk::roof::FileStore;
use rustyline::Editor;
use std::thread;
use tracing::warn;

/// 输入线程在 Ctrl+C 时发送的标记
const SIGINT: &str = "SIGINT";

/// Shell 命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Open(String),
    Close(String),
    View(String),
    Status,
    Phase,
    Stop,
    Speed(i32),
    ResetFault,
    Metrics,
    Record,
    Help,
    Exit,
    /// Ctrl+C：停止电机
    Interrupt,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, args)) = parts.split_first() else {
            anyhow::bail!("空命令");
        };

        let user = |name: &str| -> Result<String> {
            match args {
                [user] => Ok((*user).to_string()),
                _ => anyhow::bail!("用法: {} <user>", name),
            }
        };
        let no_args = |cmd: ShellCommand| -> Result<ShellCommand> {
            if args.is_empty() {
                Ok(cmd)
            } else {
                anyhow::bail!("{} 不接受参数", head)
            }
        };

        match head {
            "open" => Ok(ShellCommand::Open(user("open")?)),
            "close" => Ok(ShellCommand::Close(user("close")?)),
            "view" => Ok(ShellCommand::View(user("view")?)),
            "speed" => match args {
                [value] => {
                    let speed = value.parse().with_context(|| format!("无效的速度值: {}", value))?;
                    Ok(ShellCommand::Speed(speed))
                },
                _ => anyhow::bail!("用法: speed <value>"),
            },
            "status" => no_args(ShellCommand::Status),
            "phase" => no_args(ShellCommand::Phase),
            "stop" => no_args(ShellCommand::Stop),
            "reset-fault" => no_args(ShellCommand::ResetFault),
            "metrics" => no_args(ShellCommand::Metrics),
            "record" => no_args(ShellCommand::Record),
            "help" => Ok(ShellCommand::Help),
            "exit" | "quit" => Ok(ShellCommand::Exit),
            SIGINT => Ok(ShellCommand::Interrupt),
            other => anyhow::bail!("未知命令: {}", other),
        }
    }
}

/// REPL 输入（专用输入线程）
pub struct ReplInput {
    command_rx: Receiver<String>,
    _input_thread: thread::JoinHandle<Result<()>>,
}

impl ReplInput {
    /// 创建专用输入线程（保留历史记录）
    pub fn new() -> Result<Self> {
        let (command_tx, command_rx) = bounded::<String>(10);

        let input_thread = thread::Builder::new()
            .name("koma-repl-input".into())
            .spawn(move || {
                use rustyline::history::DefaultHistory;

                let mut rl = Editor::<(), DefaultHistory>::new()
                    .map_err(|e| anyhow::anyhow!("Failed to initialize readline: {}", e))?;

                let history_path = history_file();
                if let Some(path) = &history_path {
                    rl.load_history(path).ok();
                }
                let save_history = |rl: &mut Editor<(), DefaultHistory>| {
                    if let Some(path) = &history_path {
                        rl.save_history(path).ok();
                    }
                };

                loop {
                    match rl.readline("koma> ") {
                        Ok(line) => {
                            let line = line.trim().to_string();
                            if line.is_empty() {
                                continue;
                            }

                            if line == "exit" || line == "quit" {
                                save_history(&mut rl);
                                let _ = command_tx.send(line);
                                break;
                            }

                            let _ = rl.add_history_entry(line.clone());
                            if command_tx.send(line).is_err() {
                                break;
                            }
                        },

                        Err(rustyline::error::ReadlineError::Interrupted) => {
                            println!("^C");
                            let _ = command_tx.send(SIGINT.to_string());
                        },

                        Err(rustyline::error::ReadlineError::Eof) => {
                            save_history(&mut rl);
                            break;
                        },

                        Err(err) => {
                            eprintln!("Error: {:?}", err);
                            break;
                        },
                    }
                }

                Ok(())
            })
            .context("创建输入线程失败")?;

        Ok(Self {
            command_rx,
            _input_thread: input_thread,
        })
    }

    /// 阻塞等待用户输入；输入线程退出（Ctrl+D）时返回 `None`
    pub fn recv_command(&self) -> Option<String> {
        self.command_rx.recv().ok()
    }
}

fn history_file() -> Option<std::path::PathBuf> {
    dirs::data_dir().map(|mut dir| {
        dir.push("koma");
        let _ = std::fs::create_dir_all(&dir);
        dir.push("history.txt");
        dir
    })
}

/// 运行 REPL 模式
pub fn run_repl(connect: ConnectArgs, store_args: StoreArgs) -> Result<()> {
    let config = CliConfig::load()?;
    let (store, key) = resolve_store(&config, &store_args)?;
    let link = link_builder(&config, &connect)?.build().context("连接电机控制器失败")?;
    let description = link.description().to_string();
    let service = RoofService::start_with_key(link, store, key).context("启动屋顶服务失败")?;

    println!("Koma CLI v{} - 交互式 Shell", env!("CARGO_PKG_VERSION"));
    println!("已连接 {}，输入 'help' 查看帮助，'exit' 退出", description);
    println!();

    let input = ReplInput::new()?;

    while let Some(line) = input.recv_command() {
        let command = match ShellCommand::parse(&line) {
            Ok(command) => command,
            Err(err) => {
                eprintln!("❌ {}", err);
                print_help_hint(&line);
                continue;
            },
        };

        if command == ShellCommand::Exit {
            println!("👋 再见！");
            break;
        }

        if let Err(err) = execute(&service, command) {
            eprintln!("❌ Error: {:#}", err);
        }
    }

    Ok(())
}

fn execute(service: &RoofService<FileStore>, command: ShellCommand) -> Result<()> {
    match command {
        ShellCommand::Open(user) => {
            let state = service.request_open(&user)?;
            println!("{}", serde_json::to_string(&state.view(&user))?);
        },
        ShellCommand::Close(user) => {
            let state = service.request_close(&user)?;
            println!("{}", serde_json::to_string(&state.view(&user))?);
        },
        ShellCommand::View(user) => {
            println!("{}", serde_json::to_string(&service.view(&user)?)?);
        },
        ShellCommand::Status => {
            println!("{}", serde_json::to_string_pretty(&service.motor_status())?);
            if let LinkHealth::Down(reason) = service.link().health() {
                warn!(
                    "Motor link down: {}",
                    reason.as_deref().unwrap_or("stopped")
                );
            }
        },
        ShellCommand::Phase => {
            println!("{}", service.phase()?);
        },
        ShellCommand::Stop => {
            service.stop()?;
            println!("🛑 已发送 STOP");
        },
        ShellCommand::Speed(speed) => {
            service.set_speed(speed)?;
            println!("✅ 速度 {}", speed);
        },
        ShellCommand::ResetFault => {
            service.reset_fault();
            println!("✅ 故障已复位");
        },
        ShellCommand::Metrics => {
            println!("{}", serde_json::to_string_pretty(&service.metrics())?);
        },
        ShellCommand::Record => {
            println!("{}", serde_json::to_string_pretty(&service.snapshot()?)?);
        },
        ShellCommand::Help => print_help(),
        ShellCommand::Interrupt => {
            eprintln!("\n🛑 Emergency stop activated!");
            service.stop()?;
        },
        ShellCommand::Exit => {},
    }
    Ok(())
}

fn print_help() {
    println!("可用命令:");
    println!("  open <user>     请求开顶");
    println!("  close <user>    释放开顶请求");
    println!("  view <user>     查看该用户视角");
    println!("  phase           逻辑屋顶状态");
    println!("  record          完整仲裁记录");
    println!("  status          电机遥测（功率 / 状态行 / 日志）");
    println!("  metrics         链路指标");
    println!("  stop            立即停止电机");
    println!("  speed <value>   设置电机速度");
    println!("  reset-fault     清除电机故障锁存");
    println!("  help            显示帮助");
    println!("  exit            退出");
    println!();
    println!("Ctrl+C 停止电机，Ctrl+D 退出");
}

fn print_help_hint(line: &str) {
    if let Some(cmd) = line.split_whitespace().next() {
        println!("💡 输入 'help' 查看 {} 的用法", cmd);
    }
}
