// 推理后端接口
//
// 检测器只依赖这个 trait，具体模型 (tract ONNX) 与测试桩都实现它。

use image::RgbImage;
use crate::error::AppResult;

/// 一个解码后的预测框，坐标为输入帧的像素坐标
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
}

impl Prediction {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> Self {
        Self { x1, y1, x2, y2, score, class_id }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &Prediction) -> f32 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        let inter = (r - l).max(0.0) * (b - t).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

pub trait InferenceBackend {
    fn name(&self) -> &'static str;

    /// 类别名称，按类别 ID 排列
    fn class_names(&self) -> &[String];

    /// 对一帧执行推理，返回得分不低于 confidence 的预测
    fn predict(&mut self, frame: &RgbImage, confidence: f32) -> AppResult<Vec<Prediction>>;
}

/// 测试用后端：返回预设的预测，并记录每次收到的帧尺寸
#[cfg(test)]
pub struct StubBackend {
    pub predictions: Vec<Prediction>,
    pub seen_sizes: std::rc::Rc<std::cell::RefCell<Vec<(u32, u32)>>>,
    pub fail: bool,
    names: Vec<String>,
}

#[cfg(test)]
impl StubBackend {
    pub fn new(predictions: Vec<Prediction>) -> Self {
        Self {
            predictions,
            seen_sizes: Default::default(),
            fail: false,
            names: vec!["Hardhat".to_string(), "NO-Hardhat".to_string()],
        }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::new(Vec::new()) }
    }
}

#[cfg(test)]
impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn predict(&mut self, frame: &RgbImage, _confidence: f32) -> AppResult<Vec<Prediction>> {
        if self.fail {
            return Err(crate::error::AppError::Model("stub failure".to_string()));
        }
        self.seen_sizes.borrow_mut().push(frame.dimensions());
        Ok(self.predictions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = Prediction::new(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = Prediction::new(20.0, 20.0, 30.0, 30.0, 0.9, 0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = Prediction::new(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = Prediction::new(5.0, 0.0, 15.0, 10.0, 0.9, 0);
        // 交集 50，并集 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }
}
