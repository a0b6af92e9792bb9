// 安全帽检测核心模块
//
// 对单帧执行推理，过滤低置信度预测，统计佩戴/未佩戴人数，并在帧上绘制标注。
// 模型推理失败不做重试，错误原样向上传递。

use image::RgbImage;
use image::imageops::FilterType;
use tracing::{debug, info, warn};
use crate::config::DetectionConfig;
use crate::detection::annotate::Annotator;
use crate::detection::backend::{InferenceBackend, Prediction};
use crate::detection::inspect::{inspect_frame, LabeledPrediction};
use crate::error::AppResult;
use crate::utils::HelmetCounts;

/// 单帧检测结果
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub counts: HelmetCounts,
    /// 标注后的帧；输入为空时原样返回
    pub annotated_frame: Option<RgbImage>,
}

impl Detection {
    pub fn total_people(&self) -> u32 {
        self.counts.total()
    }

    pub fn with_helmet(&self) -> u32 {
        self.counts.with_helmet
    }

    pub fn without_helmet(&self) -> u32 {
        self.counts.without_helmet
    }
}

pub struct HelmetDetector {
    backend: Box<dyn InferenceBackend>,
    annotator: Annotator,
    confidence_floor: f32,
    min_frame_size: u32,
    helmet_class_id: usize,
    labels: [String; 2],
}

impl HelmetDetector {
    pub fn new(backend: Box<dyn InferenceBackend>, annotator: Annotator, config: &DetectionConfig) -> Self {
        let names = backend.class_names();
        let label = |i: usize, fallback: &str| {
            names.get(i).cloned().unwrap_or_else(|| fallback.to_string())
        };
        let no_helmet_id = if config.helmet_class_id == 0 { 1 } else { 0 };
        let labels = [
            label(config.helmet_class_id, "Hardhat"),
            label(no_helmet_id, "NO-Hardhat"),
        ];

        info!(
            "[DETECTOR] 后端={}, 置信度下限={}, 最小边={}, 佩戴类别={}",
            backend.name(), config.confidence_threshold, config.min_frame_size, config.helmet_class_id
        );

        Self {
            backend,
            annotator,
            confidence_floor: config.confidence_threshold,
            min_frame_size: config.min_frame_size,
            helmet_class_id: config.helmet_class_id,
            labels,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// 通用多类别检测，与安全帽统计共用模型和字体
    pub fn inspect(&mut self, frame: RgbImage) -> AppResult<(Vec<LabeledPrediction>, RgbImage)> {
        inspect_frame(self.backend.as_mut(), &self.annotator, frame, self.confidence_floor)
    }

    /// 检测一帧
    pub fn detect_frame(&mut self, frame: Option<RgbImage>) -> AppResult<Detection> {
        let frame = match frame {
            Some(f) if f.width() > 0 && f.height() > 0 => f,
            other => {
                warn!("[DETECTOR] 输入帧无效，跳过检测");
                return Ok(Detection {
                    annotated_frame: other,
                    ..Default::default()
                });
            }
        };

        let mut frame = match upscale_dimensions(frame.width(), frame.height(), self.min_frame_size) {
            Some((w, h)) => {
                debug!("[DETECTOR] 放大图像 {}x{} -> {}x{}", frame.width(), frame.height(), w, h);
                image::imageops::resize(&frame, w, h, FilterType::Triangle)
            }
            None => frame,
        };

        let predictions: Vec<Prediction> = self
            .backend
            .predict(&frame, self.confidence_floor)?
            .into_iter()
            .filter(|p| p.score > self.confidence_floor)
            .collect();

        let with_helmet = predictions
            .iter()
            .filter(|p| p.class_id == self.helmet_class_id)
            .count() as u32;
        let counts = HelmetCounts::new(with_helmet, predictions.len() as u32 - with_helmet);

        debug!(
            "[DETECTOR] 有效预测 {} 个，得分: {:?}",
            predictions.len(),
            predictions.iter().map(|p| format!("{:.2}", p.score)).collect::<Vec<_>>()
        );

        self.annotator.annotate_helmets(&mut frame, &predictions, self.helmet_class_id, &self.labels, &counts);

        debug!(
            "[DETECTOR] 检测结果 总数={} 佩戴={} 未佩戴={}",
            counts.total(), counts.with_helmet, counts.without_helmet
        );

        Ok(Detection {
            counts,
            annotated_frame: Some(frame),
        })
    }
}

/// 任一边小于 floor 时按比例放大，使短边恰好等于 floor；无需放大返回 None
pub fn upscale_dimensions(width: u32, height: u32, floor: u32) -> Option<(u32, u32)> {
    if width >= floor && height >= floor {
        return None;
    }
    let shorter = width.min(height) as u64;
    let scale = |side: u32| -> u32 {
        if side as u64 == shorter {
            floor
        } else {
            (side as u64 * floor as u64 / shorter) as u32
        }
    };
    Some((scale(width), scale(height)))
}
