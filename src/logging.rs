// HardhatMonitor - 日志管理模块
// 日志按天写入 data/logs，异步非阻塞

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use crate::config::{AppConfig, LogLevel};

/// 日志保留天数
const LOG_RETENTION_DAYS: u64 = 7;

/// 日志文件名前缀，轮转后追加日期
const LOG_FILE_PREFIX: &str = "hardhat-monitor.log";

/// 推理库在加载模型时日志很多，只保留 warn
const NOISY_TARGETS: [&str; 3] = ["tract_core", "tract_onnx", "tract_hir"];

/// 日志系统在全局配置之前初始化，这里直接读配置文件；读不到用默认级别
fn read_log_level_from_config(app_data_dir: &Path) -> LogLevel {
    fs::read_to_string(app_data_dir.join("config.json"))
        .ok()
        .and_then(|content| serde_json::from_str::<AppConfig>(&content).ok())
        .map(|config| config.log_level)
        .unwrap_or_default()
}

/// 过滤规则：配置级别 + 推理库降噪
fn filter_directives(level: LogLevel) -> String {
    let mut directives = vec![level.as_str().to_string()];
    directives.extend(NOISY_TARGETS.iter().map(|t| format!("{}=warn", t)));
    directives.join(",")
}

/// 初始化日志系统
///
/// 返回 WorkerGuard，必须在 main 函数中保持存活，否则异步日志线程会提前退出。
/// 设置了 RUST_LOG 时以环境变量为准。
pub fn init_logging(app_data_dir: &Path) -> WorkerGuard {
    let log_dir = app_data_dir.join("logs");
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("创建日志目录失败: {}", e);
    }
    cleanup_old_logs(&log_dir, SystemTime::now());

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let directives = filter_directives(read_log_level_from_config(app_data_dir));
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    // 文件日志带源码位置和线程 ID
    let file_layer = fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true);

    // debug 构建额外输出到 stderr，stdout 留给命令结果
    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    }

    guard
}

/// 是否为本程序写出、且超过保留期的日志
fn is_expired_log(file_name: &str, modified: SystemTime, now: SystemTime) -> bool {
    if !file_name.starts_with(LOG_FILE_PREFIX) {
        return false;
    }
    let retention = Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    now.duration_since(modified).map(|age| age > retention).unwrap_or(false)
}

/// 清理超过保留期限的旧日志文件
fn cleanup_old_logs(log_dir: &Path, now: SystemTime) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };

        if is_expired_log(file_name, modified, now) {
            if let Err(e) = fs::remove_file(&path) {
                eprintln!("删除旧日志文件失败 {:?}: {}", path, e);
            }
        }
    }
}
