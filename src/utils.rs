// 工具模块

use std::path::PathBuf;
use std::process::Command;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

/// Windows 下隐藏控制台窗口的标志
#[cfg(target_os = "windows")]
pub const CREATE_NO_WINDOW: u32 = 0x08000000;

/// 创建一个隐藏控制台窗口的 Command（Windows 专用）
/// 在非 Windows 平台上等同于 Command::new
#[cfg(target_os = "windows")]
pub fn hidden_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(not(target_os = "windows"))]
pub fn hidden_command(program: &str) -> Command {
    Command::new(program)
}

/// 工地信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub manager_name: String,
    pub manager_phone: String,
}

/// 手动修改记录时总人数的上限
pub const MAX_RECORD_PEOPLE: u32 = 1000;

/// 一帧的人数统计
///
/// 总人数始终由两类人数相加得到
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmetCounts {
    pub with_helmet: u32,
    pub without_helmet: u32,
}

impl HelmetCounts {
    pub fn new(with_helmet: u32, without_helmet: u32) -> Self {
        Self { with_helmet, without_helmet }
    }

    /// 手动输入的人数，总数超过上限时返回 None
    pub fn checked(with_helmet: u32, without_helmet: u32) -> Option<Self> {
        with_helmet
            .checked_add(without_helmet)
            .filter(|total| *total <= MAX_RECORD_PEOPLE)
            .map(|_| Self::new(with_helmet, without_helmet))
    }

    pub fn total(&self) -> u32 {
        self.with_helmet.saturating_add(self.without_helmet)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// 佩戴率，总人数为 0 时返回 0
    pub fn compliance_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.with_helmet as f64 / self.total() as f64
        }
    }
}

/// 检测记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: i64,
    pub site_id: i64,
    pub detection_time: NaiveDateTime,
    pub total_people: u32,
    pub with_helmet: u32,
    pub without_helmet: u32,
    pub image_path: String,
}

impl DetectionRecord {
    pub fn counts(&self) -> HelmetCounts {
        HelmetCounts::new(self.with_helmet, self.without_helmet)
    }
}

/// 带工地信息的检测记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordWithSite {
    pub record: DetectionRecord,
    pub site_name: String,
    pub manager_name: String,
    pub manager_phone: String,
}

/// 记录查询条件，全部为空时返回所有记录
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// 工地名称（模糊匹配，不区分大小写）
    pub site_name: Option<String>,
    /// 起始日期（含）
    pub start_date: Option<NaiveDate>,
    /// 结束日期（含）
    pub end_date: Option<NaiveDate>,
}

/// 佩戴率预警
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceWarning {
    pub site_id: i64,
    pub site_name: String,
    pub manager_name: String,
    pub manager_phone: String,
    pub total_records: u32,
    pub compliance_rate: f64,
}

/// 单日统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatistics {
    pub date: NaiveDate,
    pub detection_count: u32,
    /// 当天所有记录总人数均为 0 时没有佩戴率
    pub avg_compliance_rate: Option<f64>,
    pub total_people: u32,
    pub total_with_helmet: u32,
    pub total_without_helmet: u32,
}

/// 获取可执行文件所在目录
pub fn get_exe_dir() -> Option<PathBuf> {
    std::env::current_exe().ok()?.parent().map(|p| p.to_path_buf())
}

/// 解析程序路径，优先使用相对于可执行文件的 ffmpeg 目录
pub fn resolve_tool_path(tool_name: &str) -> String {
    let file_name = format!("{}{}", tool_name, std::env::consts::EXE_SUFFIX);
    if let Some(exe_dir) = get_exe_dir() {
        // 检查 ffmpeg 子目录
        let tool_path = exe_dir.join("ffmpeg").join(&file_name);
        if tool_path.exists() {
            return tool_path.to_string_lossy().to_string();
        }
        // 检查可执行文件同级目录
        let tool_path = exe_dir.join(&file_name);
        if tool_path.exists() {
            return tool_path.to_string_lossy().to_string();
        }
    }
    // 回退到系统 PATH
    tool_name.to_string()
}

/// 截图文件名，精确到毫秒避免同一秒内的保存互相覆盖
pub fn capture_file_name(now: NaiveDateTime) -> String {
    format!("capture_{}.jpg", now.format("%Y%m%d_%H%M%S_%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_total_is_sum() {
        let counts = HelmetCounts::new(7, 3);
        assert_eq!(counts.total(), 10);
        assert!((counts.compliance_rate() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_checked_counts_limit() {
        assert_eq!(HelmetCounts::checked(600, 400), Some(HelmetCounts::new(600, 400)));
        assert_eq!(HelmetCounts::checked(600, 401), None);
        assert_eq!(HelmetCounts::checked(u32::MAX, 1), None);
    }

    #[test]
    fn test_empty_counts_rate_is_zero() {
        let counts = HelmetCounts::default();
        assert!(counts.is_empty());
        assert_eq!(counts.compliance_rate(), 0.0);
    }

    #[test]
    fn test_capture_file_name_format() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_milli_opt(8, 9, 10, 42)
            .unwrap();
        assert_eq!(capture_file_name(t), "capture_20240305_080910_042.jpg");
    }
}
