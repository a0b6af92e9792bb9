// 检测结果标注
//
// 在帧上绘制检测框、类别标签与左上角的人数统计

use std::path::PathBuf;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{info, warn};
use crate::detection::backend::Prediction;
use crate::utils::HelmetCounts;

pub const COLOR_HELMET: Rgb<u8> = Rgb([0, 255, 0]);
pub const COLOR_NO_HELMET: Rgb<u8> = Rgb([255, 0, 0]);
pub const COLOR_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
/// 通用检测统一使用的框颜色
pub const COLOR_GENERIC: Rgb<u8> = Rgb([255, 160, 0]);

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 18.0;
const COUNTER_SCALE: f32 = 26.0;
/// 三行统计文字的基线位置
const COUNTER_BASELINES: [i32; 3] = [30, 60, 90];

/// 常见系统字体位置
fn font_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::font_dir() {
        candidates.push(dir.join("DejaVuSans.ttf"));
    }
    candidates.extend(
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "/Library/Fonts/Arial.ttf",
        ]
        .iter()
        .map(PathBuf::from),
    );
    candidates
}

fn read_font(path: &PathBuf) -> Option<FontVec> {
    let bytes = std::fs::read(path).ok()?;
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("[ANNOTATE] 字体文件无效 {}: {}", path.display(), e);
            None
        }
    }
}

pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// 加载标注字体，找不到时只画框不写字
    pub fn load(font_path: Option<&str>) -> Self {
        let candidates = match font_path {
            Some(p) => vec![PathBuf::from(p)],
            None => font_candidates(),
        };

        for path in &candidates {
            if let Some(font) = read_font(path) {
                info!("[ANNOTATE] 使用字体: {}", path.display());
                return Self { font: Some(font) };
            }
        }

        warn!("[ANNOTATE] 未找到可用字体，标注将只绘制检测框");
        Self::without_font()
    }

    pub fn without_font() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 绘制二分类安全帽标注：每个框按是否佩戴着色，并在左上角写三行统计
    pub fn annotate_helmets(
        &self,
        canvas: &mut RgbImage,
        predictions: &[Prediction],
        helmet_class_id: usize,
        labels: &[String; 2],
        counts: &HelmetCounts,
    ) {
        for pred in predictions {
            let (color, name) = if pred.class_id == helmet_class_id {
                (COLOR_HELMET, &labels[0])
            } else {
                (COLOR_NO_HELMET, &labels[1])
            };
            self.draw_box(canvas, pred, color, &format!("{} {:.2}", name, pred.score));
        }

        let lines = [
            (format!("Total: {}", counts.total()), COLOR_TEXT),
            (format!("With Helmet: {}", counts.with_helmet), COLOR_HELMET),
            (format!("Without Helmet: {}", counts.without_helmet), COLOR_NO_HELMET),
        ];
        if let Some(font) = &self.font {
            let scale = PxScale::from(COUNTER_SCALE);
            for ((text, color), baseline) in lines.iter().zip(COUNTER_BASELINES) {
                let (_, h) = text_size(scale, font, text);
                draw_text_mut(canvas, *color, 10, baseline - h as i32, scale, font, text);
            }
        }
    }

    /// 通用多类别标注，所有框同一颜色，标签为类别名
    pub fn annotate_generic(&self, canvas: &mut RgbImage, predictions: &[Prediction], class_names: &[String]) {
        for pred in predictions {
            let name = class_names
                .get(pred.class_id)
                .cloned()
                .unwrap_or_else(|| format!("class{}", pred.class_id));
            self.draw_box(canvas, pred, COLOR_GENERIC, &format!("{} {:.2}", name, pred.score));
        }
    }

    fn draw_box(&self, canvas: &mut RgbImage, pred: &Prediction, color: Rgb<u8>, label: &str) {
        let (cw, ch) = canvas.dimensions();
        if cw == 0 || ch == 0 {
            return;
        }
        let x1 = (pred.x1.round() as i32).clamp(0, cw as i32 - 1);
        let y1 = (pred.y1.round() as i32).clamp(0, ch as i32 - 1);
        let x2 = (pred.x2.round() as i32).clamp(0, cw as i32 - 1);
        let y2 = (pred.y2.round() as i32).clamp(0, ch as i32 - 1);

        for t in 0..BOX_THICKNESS {
            let w = x2 - x1 - 2 * t;
            let h = y2 - y1 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(LABEL_SCALE);
        let (tw, th) = text_size(scale, font, label);
        if tw == 0 || th == 0 {
            return;
        }
        // 标签放在框上方，贴近顶部时放进框内
        let ty = if y1 >= th as i32 + 4 { y1 - th as i32 - 4 } else { y1 };
        draw_filled_rect_mut(canvas, Rect::at(x1, ty).of_size(tw + 4, th + 4), color);
        draw_text_mut(canvas, Rgb([0, 0, 0]), x1 + 2, ty + 2, scale, font, label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> [String; 2] {
        ["Hardhat".to_string(), "NO-Hardhat".to_string()]
    }

    #[test]
    fn test_boxes_use_class_colors() {
        let annotator = Annotator::without_font();
        let mut canvas = RgbImage::new(100, 100);
        let preds = vec![
            Prediction::new(10.0, 10.0, 40.0, 40.0, 0.9, 0),
            Prediction::new(50.0, 50.0, 90.0, 90.0, 0.8, 1),
        ];
        annotator.annotate_helmets(&mut canvas, &preds, 0, &labels(), &HelmetCounts::new(1, 1));
        assert_eq!(*canvas.get_pixel(10, 20), COLOR_HELMET);
        assert_eq!(*canvas.get_pixel(11, 20), COLOR_HELMET);
        assert_eq!(*canvas.get_pixel(50, 70), COLOR_NO_HELMET);
        // 框内部不填充
        assert_eq!(*canvas.get_pixel(25, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_degenerate_box_does_not_panic() {
        let annotator = Annotator::without_font();
        let mut canvas = RgbImage::new(20, 20);
        let preds = vec![
            Prediction::new(5.0, 5.0, 5.0, 5.0, 0.9, 0),
            Prediction::new(-30.0, -30.0, 500.0, 500.0, 0.9, 1),
        ];
        annotator.annotate_generic(&mut canvas, &preds, &[]);
        assert_eq!(*canvas.get_pixel(0, 10), COLOR_GENERIC);

        let mut empty = RgbImage::new(0, 0);
        annotator.annotate_generic(&mut empty, &preds, &[]);
        assert_eq!(empty.dimensions(), (0, 0));
    }

    #[test]
    fn test_missing_font_file_falls_back() {
        let annotator = Annotator::load(Some("/nonexistent/font.ttf"));
        assert!(!annotator.has_font());
    }
}
