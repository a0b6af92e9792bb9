// 错误处理模块

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("图像处理错误: {0}")]
    Image(#[from] image::ImageError),

    #[error("FFmpeg 错误: {0}")]
    FFmpeg(String),

    #[error("模型推理错误: {0}")]
    Model(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 面向用户的提示，操作被中止但状态未改变
    #[error("{0}")]
    Warning(String),
}

impl AppError {
    /// 模型调用失败没有恢复路径，由调用栈顶层终止进程
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Model(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
