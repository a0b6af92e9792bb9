// 通用多类别检测
//
// 与安全帽统计相互独立：列出模型给出的所有类别，不做佩戴判断

use image::RgbImage;
use tracing::{debug, warn};
use crate::detection::annotate::Annotator;
use crate::detection::backend::{InferenceBackend, Prediction};
use crate::error::AppResult;

/// 一条带类别名的预测
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPrediction {
    pub class_name: String,
    pub prediction: Prediction,
}

/// 对一张图执行推理并绘制所有检测框
pub fn inspect_frame(
    backend: &mut dyn InferenceBackend,
    annotator: &Annotator,
    mut frame: RgbImage,
    confidence: f32,
) -> AppResult<(Vec<LabeledPrediction>, RgbImage)> {
    if frame.width() == 0 || frame.height() == 0 {
        warn!("[INSPECT] 输入图像为空，跳过检测");
        return Ok((Vec::new(), frame));
    }

    let predictions: Vec<Prediction> = backend
        .predict(&frame, confidence)?
        .into_iter()
        .filter(|p| p.score > confidence)
        .collect();

    let class_names = backend.class_names();
    annotator.annotate_generic(&mut frame, &predictions, class_names);

    let labeled = predictions
        .into_iter()
        .map(|p| LabeledPrediction {
            class_name: class_names
                .get(p.class_id)
                .cloned()
                .unwrap_or_else(|| format!("class{}", p.class_id)),
            prediction: p,
        })
        .collect::<Vec<_>>();

    debug!("[INSPECT] {} 个目标", labeled.len());
    Ok((labeled, frame))
}
