// 检测模块
//
// 子模块：
// - backend: 推理后端接口与预测框
// - yolo: 基于 tract 的 YOLOv8 ONNX 后端
// - detector: 安全帽检测与人数统计
// - annotate: 检测框与统计文字绘制
// - inspect: 通用多类别检测

pub mod annotate;
pub mod backend;
pub mod detector;
pub mod inspect;
pub mod yolo;

pub use detector::{Detection, HelmetDetector};
