// YOLOv8 ONNX 推理后端 (tract)
//
// 预处理：等比缩放后贴到方形画布左上角，其余区域填充 144/255
// 后处理：解码 [1, 4+nc, N] 输出（也兼容转置的 [1, N, 4+nc]），按类别做 NMS

use std::path::Path;
use image::RgbImage;
use image::imageops::FilterType;
use tract_onnx::prelude::*;
use tracing::{debug, info};
use crate::detection::backend::{InferenceBackend, Prediction};
use crate::error::{AppError, AppResult};

const CXYWH_OFFSET: usize = 4;
const PAD_VALUE: f32 = 144.0 / 255.0;

pub struct YoloBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    iou_threshold: f32,
    class_names: Vec<String>,
}

impl YoloBackend {
    /// 从本地文件加载 ONNX 模型
    pub fn new(
        model_path: &Path,
        input_size: u32,
        iou_threshold: f32,
        class_names: Vec<String>,
    ) -> AppResult<Self> {
        info!("[YOLO] 加载模型: {} (输入 {}x{})", model_path.display(), input_size, input_size);

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|m| {
                m.with_input_fact(
                    0,
                    InferenceFact::dt_shape(
                        f32::datum_type(),
                        tvec!(1, 3, input_size as usize, input_size as usize),
                    ),
                )
            })
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| AppError::Model(format!("加载模型失败 {}: {:#}", model_path.display(), e)))?;

        info!("[YOLO] 模型加载完成，类别: {:?}", class_names);

        Ok(Self {
            model,
            input_size,
            iou_threshold,
            class_names,
        })
    }

    fn letterbox(&self, frame: &RgbImage) -> (Tensor, f32) {
        let size = self.input_size as usize;
        let (w0, h0) = frame.dimensions();
        let ratio = letterbox_ratio(w0, h0, self.input_size);
        let w = ((w0 as f32 * ratio).round() as u32).clamp(1, self.input_size);
        let h = ((h0 as f32 * ratio).round() as u32).clamp(1, self.input_size);
        let resized = image::imageops::resize(frame, w, h, FilterType::Triangle);

        let mut input = tract_ndarray::Array4::<f32>::from_elem((1, 3, size, size), PAD_VALUE);
        for (x, y, pixel) in resized.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let (x, y) = (x as usize, y as usize);
            input[[0, 0, y, x]] = r as f32 / 255.0;
            input[[0, 1, y, x]] = g as f32 / 255.0;
            input[[0, 2, y, x]] = b as f32 / 255.0;
        }

        (input.into_tensor(), ratio)
    }
}

impl InferenceBackend for YoloBackend {
    fn name(&self) -> &'static str {
        "tract-yolov8"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn predict(&mut self, frame: &RgbImage, confidence: f32) -> AppResult<Vec<Prediction>> {
        let (input, ratio) = self.letterbox(frame);

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| AppError::Model(format!("模型推理失败: {:#}", e)))?;

        let output = outputs
            .first()
            .ok_or_else(|| AppError::Model("模型没有输出".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| AppError::Model(format!("模型输出不是 f32: {:#}", e)))?;

        let shape = view.shape().to_vec();
        let (w0, h0) = frame.dimensions();
        let candidates = decode_output(
            &view,
            self.class_names.len(),
            ratio,
            w0 as f32,
            h0 as f32,
            confidence,
        )?;
        let kept = non_max_suppression(candidates, self.iou_threshold);
        debug!("[YOLO] 输出 {:?}，NMS 后保留 {} 个", shape, kept.len());
        Ok(kept)
    }
}

/// 等比缩放系数，保证整张图放入方形输入
pub fn letterbox_ratio(w0: u32, h0: u32, input_size: u32) -> f32 {
    (input_size as f32 / w0 as f32).min(input_size as f32 / h0 as f32)
}

/// 判断输出布局，返回 (是否转置, 通道数, 锚点数)
///
/// 已知类别数时按通道数 4+nc 匹配维度；类别数未知 (0) 时假定通道数小于锚点数
fn output_layout(shape: &[usize], num_classes: usize) -> AppResult<(bool, usize, usize)> {
    let transposed = if num_classes > 0 {
        let channels = CXYWH_OFFSET + num_classes;
        if shape[1] == channels {
            false
        } else if shape[2] == channels {
            true
        } else {
            return Err(AppError::Model(format!(
                "输出形状 {:?} 与类别数 {} 不符", shape, num_classes
            )));
        }
    } else {
        shape[1] > shape[2]
    };

    let (channels, anchors) = if transposed { (shape[2], shape[1]) } else { (shape[1], shape[2]) };
    if channels <= CXYWH_OFFSET {
        return Err(AppError::Model(format!("输出通道数过少: {:?}", shape)));
    }
    Ok((transposed, channels, anchors))
}

/// 解码原始输出为预测框，坐标还原到原图并裁剪到图像范围
pub fn decode_output(
    output: &tract_ndarray::ArrayViewD<'_, f32>,
    num_classes: usize,
    ratio: f32,
    width: f32,
    height: f32,
    confidence: f32,
) -> AppResult<Vec<Prediction>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(AppError::Model(format!("不支持的输出形状: {:?}", shape)));
    }

    let (transposed, channels, anchors) = output_layout(shape, num_classes)?;

    let at = |c: usize, i: usize| -> f32 {
        if transposed {
            output[[0, i, c]]
        } else {
            output[[0, c, i]]
        }
    };

    let mut predictions = Vec::new();
    for i in 0..anchors {
        let (class_id, score) = (CXYWH_OFFSET..channels)
            .map(|c| (c - CXYWH_OFFSET, at(c, i)))
            .fold((0usize, f32::NEG_INFINITY), |best, x| if x.1 > best.1 { x } else { best });

        if score < confidence {
            continue;
        }

        let cx = at(0, i) / ratio;
        let cy = at(1, i) / ratio;
        let w = at(2, i) / ratio;
        let h = at(3, i) / ratio;

        predictions.push(Prediction::new(
            (cx - w / 2.0).clamp(0.0, width),
            (cy - h / 2.0).clamp(0.0, height),
            (cx + w / 2.0).clamp(0.0, width),
            (cy + h / 2.0).clamp(0.0, height),
            score,
            class_id,
        ));
    }

    Ok(predictions)
}

/// 按类别分别做 NMS，结果按得分降序
pub fn non_max_suppression(mut xs: Vec<Prediction>, iou_threshold: f32) -> Vec<Prediction> {
    xs.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Prediction> = Vec::with_capacity(xs.len());
    for candidate in xs {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
