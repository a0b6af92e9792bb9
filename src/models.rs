// 模型管理模块
//
// 检测模型为本地 ONNX 文件，默认放在数据目录的 models 文件夹下

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use crate::config::DetectionConfig;
use crate::detection::annotate::Annotator;
use crate::detection::yolo::YoloBackend;
use crate::detection::HelmetDetector;
use crate::error::{AppError, AppResult};

/// 设置后覆盖默认的 models 目录
const MODELS_DIR_ENV: &str = "HARDHAT_MODELS_DIR";

/// 模型状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    /// 解析后的模型路径
    pub path: String,
    /// 文件是否存在
    pub downloaded: bool,
    /// 文件大小 (bytes)
    pub file_size: Option<u64>,
}

/// 获取模型目录
/// 优先使用环境变量 HARDHAT_MODELS_DIR，未设置则为数据目录下的 models
pub fn get_models_dir(app_data_dir: &Path) -> PathBuf {
    if let Some(dir) = std::env::var_os(MODELS_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    app_data_dir.join("models")
}

pub fn ensure_models_dir(app_data_dir: &Path) -> std::io::Result<PathBuf> {
    let dir = get_models_dir(app_data_dir);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// 绝对路径原样使用，相对路径基于模型目录
pub fn resolve_model_path(app_data_dir: &Path, configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        get_models_dir(app_data_dir).join(path)
    }
}

/// 检查模型文件是否就绪
pub fn check_model_downloaded(app_data_dir: &Path, config: &DetectionConfig) -> ModelStatus {
    let path = resolve_model_path(app_data_dir, &config.model_path);
    let file_size = fs::metadata(&path).ok().filter(|m| m.is_file()).map(|m| m.len());

    ModelStatus {
        path: path.to_string_lossy().to_string(),
        downloaded: file_size.is_some(),
        file_size,
    }
}

/// 加载 ONNX 推理后端
pub fn load_backend(app_data_dir: &Path, config: &DetectionConfig) -> AppResult<YoloBackend> {
    let status = check_model_downloaded(app_data_dir, config);
    if !status.downloaded {
        return Err(AppError::NotFound(format!(
            "检测模型文件不存在: {}，请将模型放到该位置或修改 config.json 中的 detection.model_path",
            status.path
        )));
    }

    YoloBackend::new(
        Path::new(&status.path),
        config.input_size,
        config.iou_threshold,
        config.class_names.clone(),
    )
}

/// 创建安全帽检测器（模型 + 标注字体）
pub fn load_detector(app_data_dir: &Path, config: &DetectionConfig) -> AppResult<HelmetDetector> {
    let backend = load_backend(app_data_dir, config)?;
    let annotator = Annotator::load(config.font_path.as_deref());
    info!("[MODELS] 检测器已就绪，标注文字: {}", if annotator.has_font() { "开启" } else { "关闭" });
    Ok(HelmetDetector::new(Box::new(backend), annotator, config))
}
