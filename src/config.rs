// 配置管理模块

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::fs;
use crate::error::{AppError, AppResult};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::info;

static CONFIG: OnceCell<RwLock<AppConfig>> = OnceCell::new();
static CONFIG_PATH: OnceCell<std::path::PathBuf> = OnceCell::new();

/// 日志级别
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    /// 转换为 tracing 过滤器字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// 安全帽检测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 模型文件路径，相对路径基于数据目录下的 models 文件夹
    pub model_path: String,
    /// 模型输入边长（正方形）
    pub input_size: u32,
    /// 置信度下限，得分必须高于此值才计入
    pub confidence_threshold: f32,
    /// NMS 的 IoU 阈值
    pub iou_threshold: f32,
    /// 图像最短边小于此值时先放大再推理
    pub min_frame_size: u32,
    /// 佩戴安全帽的类别 ID，其余类别一律视为未佩戴
    pub helmet_class_id: usize,
    /// 类别名称，按类别 ID 排列
    pub class_names: Vec<String>,
    /// 标注文字使用的 TrueType 字体
    pub font_path: Option<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: "hardhat-yolov8.onnx".to_string(),
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            min_frame_size: 640,
            helmet_class_id: 0,
            class_names: vec!["Hardhat".to_string(), "NO-Hardhat".to_string()],
            font_path: None,
        }
    }
}

/// 视频/摄像头播放配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// 两帧之间的间隔 (毫秒)
    pub frame_interval_ms: u64,
    /// 摄像头设备编号
    pub camera_index: u32,
    /// 摄像头输出宽度
    pub camera_width: u32,
    /// 摄像头输出高度
    pub camera_height: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 30,
            camera_index: 0,
            camera_width: 640,
            camera_height: 480,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 数据库文件名
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// 截图保存目录
    #[serde(default = "default_capture_dir")]
    pub capture_dir: String,
    /// 检测配置
    #[serde(default)]
    pub detection: DetectionConfig,
    /// 播放配置
    #[serde(default)]
    pub playback: PlaybackConfig,
    /// 佩戴率预警阈值
    #[serde(default = "default_compliance_threshold")]
    pub compliance_threshold: f64,
    /// 日志级别
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_database_file() -> String {
    "helmet_detection.db".to_string()
}

fn default_capture_dir() -> String {
    "captured_images".to_string()
}

fn default_compliance_threshold() -> f64 {
    0.8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            capture_dir: default_capture_dir(),
            detection: DetectionConfig::default(),
            playback: PlaybackConfig::default(),
            compliance_threshold: default_compliance_threshold(),
            log_level: LogLevel::default(),
        }
    }
}

/// 读取配置文件，不存在时写入默认配置
pub fn load_config(config_path: &Path) -> AppResult<AppConfig> {
    if config_path.exists() {
        let content = fs::read_to_string(config_path)?;
        Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("配置文件 JSON 解析失败: {}，使用默认配置", e);
            AppConfig::default()
        }))
    } else {
        let config = AppConfig::default();
        let content = serde_json::to_string_pretty(&config)?;
        fs::write(config_path, content)?;
        Ok(config)
    }
}

/// 初始化配置
pub fn init_config(config_path: &Path) -> AppResult<()> {
    CONFIG_PATH.set(config_path.to_path_buf())
        .map_err(|_| AppError::Config("配置路径已初始化".to_string()))?;

    let config = load_config(config_path)?;

    info!("[CONFIG] 配置已加载");

    CONFIG.set(RwLock::new(config))
        .map_err(|_| AppError::Config("配置已初始化".to_string()))?;

    Ok(())
}

/// 获取配置
pub fn get_config() -> AppConfig {
    CONFIG.get()
        .map(|c| c.read().clone())
        .unwrap_or_default()
}

/// 更新配置
pub fn update_config(config: AppConfig) -> AppResult<()> {
    info!("[CONFIG] 配置更新");

    // 先写入文件，成功后再更新内存，避免文件写入失败导致内存与文件不一致
    if let Some(path) = CONFIG_PATH.get() {
        let content = serde_json::to_string_pretty(&config)?;
        fs::write(path, content)?;
    }

    if let Some(lock) = CONFIG.get() {
        let mut current = lock.write();
        *current = config;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_detection_policy() {
        let config = AppConfig::default();
        assert_eq!(config.detection.confidence_threshold, 0.25);
        assert_eq!(config.detection.min_frame_size, 640);
        assert_eq!(config.detection.helmet_class_id, 0);
        assert_eq!(config.playback.frame_interval_ms, 30);
        assert!((config.compliance_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = load_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.database_file, "helmet_detection.db");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"compliance_threshold": 0.9, "detection": {"input_size": 320}}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert!((config.compliance_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.detection.input_size, 320);
        assert_eq!(config.detection.confidence_threshold, 0.25);
        assert_eq!(config.capture_dir, "captured_images");
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.playback.camera_width, 640);
    }
}
