// HardhatMonitor - 工地安全帽佩戴检测与记录工具
// 主入口文件

mod commands;
mod video;
mod database;
mod config;
mod error;
mod utils;
mod models;
mod logging;
mod detection;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use clap::Parser;
use tracing::{error, info, warn};
use commands::{Cli, Command, ConsoleLine, Session};
use database::Store;
use error::{AppError, AppResult};

/// 获取应用数据目录（可执行文件同级的 data 文件夹）
fn get_app_data_dir() -> PathBuf {
    // 优先使用可执行文件所在目录
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            // 开发模式下，exe 在 target/debug 或 target/release 目录，需要回到项目根目录
            let in_target = ["debug", "release"].iter().any(|profile| {
                exe_dir.ends_with(Path::new("target").join(profile))
            });
            let data_dir = if in_target {
                exe_dir
                    .parent()
                    .and_then(|p| p.parent())
                    .map(|p| p.join("data"))
                    .unwrap_or_else(|| exe_dir.join("data"))
            } else {
                // 生产环境，数据目录在 exe 同级
                exe_dir.join("data")
            };
            return data_dir;
        }
    }

    // 回退到当前工作目录
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("data")
}

/// 配置中的相对路径基于数据目录
fn resolve_in_data_dir(app_dir: &Path, configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        app_dir.join(path)
    }
}

/// 初始化配置、目录和数据库
fn open_session(app_dir: &Path) -> AppResult<Session> {
    std::fs::create_dir_all(app_dir)?;

    let config_path = app_dir.join("config.json");
    config::init_config(&config_path)?;
    let config = config::get_config();

    let capture_dir = resolve_in_data_dir(app_dir, &config.capture_dir);
    if let Err(e) = std::fs::create_dir_all(&capture_dir) {
        warn!("创建截图目录失败: {}", e);
    }
    if let Err(e) = models::ensure_models_dir(app_dir) {
        warn!("创建模型目录失败: {}", e);
    }

    let status = models::check_model_downloaded(app_dir, &config.detection);
    match status.file_size {
        Some(size) => info!("检测模型: {} ({} bytes)", status.path, size),
        None => warn!("检测模型文件不存在: {}", status.path),
    }

    let store = Store::open(&resolve_in_data_dir(app_dir, &config.database_file))?;
    Ok(Session::new(store, app_dir.to_path_buf(), capture_dir))
}

/// 打印命令结果；致命错误返回给调用方
fn report(result: AppResult<String>) -> AppResult<()> {
    match result {
        Ok(text) => {
            if !text.is_empty() {
                println!("{}", text);
            }
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(AppError::Warning(msg)) => {
            println!("警告: {}", msg);
            Ok(())
        }
        Err(e) => {
            warn!("命令执行失败: {}", e);
            println!("错误: {}", e);
            Ok(())
        }
    }
}

/// 交互控制台，逐行解析并执行命令
fn run_console(session: &mut Session) -> AppResult<()> {
    let playing = session.playing.clone();
    let stop = session.stop.clone();
    // 播放中 Ctrl-C 只暂停，其余时候退出
    if let Err(e) = ctrlc::set_handler(move || {
        if playing.load(Ordering::SeqCst) {
            stop.store(true, Ordering::SeqCst);
        } else {
            std::process::exit(130);
        }
    }) {
        warn!("注册 Ctrl-C 处理失败: {}", e);
    }

    println!("HardhatMonitor 控制台，输入 help 查看命令，quit 退出");
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let tokens = commands::split_line(&line);
        if tokens.is_empty() {
            continue;
        }

        let command = match ConsoleLine::try_parse_from(&tokens) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                // clap 的帮助输出也走这里
                println!("{}", e);
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }

        report(commands::dispatch(session, command))?;
    }

    session.close_source();
    Ok(())
}

fn run(cli: Cli, app_dir: &Path) -> AppResult<()> {
    let mut session = open_session(app_dir)?;
    info!("数据目录: {:?}", app_dir);

    match cli.command {
        Some(Command::Quit) => Ok(()),
        Some(command) => report(commands::dispatch(&mut session, command)),
        None => run_console(&mut session),
    }
}

fn main() {
    let cli = Cli::parse();
    let app_dir = cli.data_dir.clone().unwrap_or_else(get_app_data_dir);

    if let Err(e) = std::fs::create_dir_all(&app_dir) {
        eprintln!("创建应用数据目录失败: {}", e);
    }

    // 初始化日志系统 - guard 必须保持存活，否则异步日志线程会退出
    let log_guard = logging::init_logging(&app_dir);

    info!("HardhatMonitor 启动中...");

    if let Err(e) = run(cli, &app_dir) {
        error!("运行失败: {}", e);
        eprintln!("错误: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }

    info!("HardhatMonitor 已退出");
}
