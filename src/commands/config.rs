// 配置命令

use crate::config::{self, LogLevel};
use crate::error::{AppError, AppResult};

/// 不带参数时打印当前配置，否则修改并写回 config.json
pub fn show_or_update(threshold: Option<f64>, log_level: Option<String>) -> AppResult<String> {
    if threshold.is_none() && log_level.is_none() {
        return Ok(serde_json::to_string_pretty(&config::get_config())?);
    }

    let mut new_config = config::get_config();
    if let Some(threshold) = threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::InvalidArgument(format!("阈值必须在 0 到 1 之间: {}", threshold)));
        }
        new_config.compliance_threshold = threshold;
    }
    if let Some(level) = log_level {
        new_config.log_level = parse_log_level(&level)?;
    }

    config::update_config(new_config)?;
    Ok("配置已保存".to_string())
}

fn parse_log_level(level: &str) -> AppResult<LogLevel> {
    serde_json::from_value(serde_json::Value::String(level.trim().to_lowercase()))
        .map_err(|_| AppError::InvalidArgument(format!("无效的日志级别: {}，可选 error/warn/info/debug/trace", level)))
}
