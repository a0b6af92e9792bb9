// 命令模块
//
// 控制台每一行解析成一条 Command，由 dispatch 在单线程中同步执行。
// 处理函数返回给用户看的文本；Warning 错误表示操作被中止且没有改变状态。

pub mod config;
pub mod media;
pub mod records;
pub mod sites;
pub mod warnings;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use regex::Regex;
use tracing::info;
use crate::database::Store;
use crate::detection::{Detection, HelmetDetector};
use crate::error::{AppError, AppResult};
use crate::models;
use crate::utils::Site;
use crate::video::FrameSource;

lazy_static::lazy_static! {
    // 双引号内的内容作为一个参数
    static ref TOKEN_REGEX: Regex = Regex::new(r#""([^"]*)"|(\S+)"#).unwrap();
}

/// 命令行入口
#[derive(Parser, Debug)]
#[command(name = "hardhat-monitor", version, about = "工地安全帽佩戴检测与记录工具")]
pub struct Cli {
    /// 数据目录（配置、数据库、截图、模型、日志）
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 不带子命令时进入交互控制台
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// 控制台中的一行
#[derive(Parser, Debug)]
#[command(name = "hardhat-monitor", no_binary_name = true, disable_version_flag = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// 打开图片并检测
    OpenImage { path: PathBuf },
    /// 打开视频文件
    OpenVideo { path: PathBuf },
    /// 打开/关闭摄像头
    Camera { index: Option<u32> },
    /// 按配置的间隔连续检测，Ctrl-C 暂停
    Play {
        #[arg(long)]
        frames: Option<u64>,
    },
    /// 不等待间隔，检测接下来的 N 帧
    Step {
        #[arg(default_value_t = 1)]
        count: u64,
    },
    /// 关闭当前视频/摄像头
    Close,
    /// 列出工地
    Sites,
    /// 添加工地
    AddSite { name: String, manager: String, phone: String },
    /// 修改工地
    UpdateSite { id: i64, name: String, manager: String, phone: String },
    /// 删除工地及其全部检测记录
    DeleteSite { id: i64 },
    /// 选择保存记录的工地（ID 或名称）
    UseSite { site: String },
    /// 保存当前检测结果
    Save,
    /// 查询检测记录
    Records {
        /// 工地名称（模糊匹配）
        #[arg(long)]
        site: Option<String>,
        /// 起始日期 YYYY-MM-DD（含）
        #[arg(long)]
        from: Option<NaiveDate>,
        /// 结束日期 YYYY-MM-DD（含）
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// 修改检测记录，总人数自动重新计算
    EditRecord {
        id: i64,
        #[arg(long)]
        site: Option<i64>,
        #[arg(long = "with")]
        with_helmet: u32,
        #[arg(long = "without")]
        without_helmet: u32,
    },
    /// 删除检测记录及其截图
    DeleteRecord { id: i64 },
    /// 查看记录截图信息
    View { id: i64 },
    /// 佩戴率预警
    Warnings {
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// 工地每日统计
    Stats {
        site_id: i64,
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// 通用多类别检测，列出所有目标
    Inspect {
        path: PathBuf,
        /// 标注图输出路径
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// 查看或修改配置
    Config {
        /// 佩戴率预警阈值
        #[arg(long)]
        threshold: Option<f64>,
        /// 日志级别（下次启动生效）
        #[arg(long)]
        log_level: Option<String>,
    },
    /// 退出
    #[command(alias = "exit")]
    Quit,
}

/// 拆分控制台输入，支持双引号包裹带空格的参数
pub fn split_line(line: &str) -> Vec<String> {
    TOKEN_REGEX
        .captures_iter(line)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 一次运行期间的全部状态，数据库连接随 Session 释放
pub struct Session {
    pub store: Store,
    pub data_dir: PathBuf,
    pub capture_dir: PathBuf,
    detector: Option<HelmetDetector>,
    pub source: Option<FrameSource>,
    pub current: Option<Detection>,
    pub selected_site: Option<Site>,
    /// 播放中为 true，Ctrl-C 处理据此决定暂停还是退出
    pub playing: Arc<AtomicBool>,
    /// 置位后播放循环在下一帧前停止
    pub stop: Arc<AtomicBool>,
}

impl Session {
    pub fn new(store: Store, data_dir: PathBuf, capture_dir: PathBuf) -> Self {
        Self {
            store,
            data_dir,
            capture_dir,
            detector: None,
            source: None,
            current: None,
            selected_site: None,
            playing: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[cfg(test)]
    pub fn with_detector(mut self, detector: HelmetDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    /// 首次需要时加载模型
    pub fn detector(&mut self) -> AppResult<&mut HelmetDetector> {
        if self.detector.is_none() {
            let config = crate::config::get_config();
            info!("[SESSION] 加载检测模型");
            let detector = models::load_detector(&self.data_dir, &config.detection)?;
            info!("[SESSION] 检测器就绪: {}", detector.backend_name());
            self.detector = Some(detector);
        }
        self.detector
            .as_mut()
            .ok_or_else(|| AppError::Model("检测器未初始化".to_string()))
    }

    /// 关闭当前帧来源
    pub fn close_source(&mut self) -> bool {
        match self.source.take() {
            Some(mut source) => {
                source.close();
                true
            }
            None => false,
        }
    }
}

/// 执行一条命令
pub fn dispatch(session: &mut Session, command: Command) -> AppResult<String> {
    match command {
        Command::OpenImage { path } => media::open_image(session, &path),
        Command::OpenVideo { path } => media::open_video(session, &path),
        Command::Camera { index } => media::toggle_camera(session, index),
        Command::Play { frames } => media::play(session, frames),
        Command::Step { count } => media::step(session, count),
        Command::Close => media::close(session),
        Command::Sites => sites::list_sites(session),
        Command::AddSite { name, manager, phone } => sites::add_site(session, &name, &manager, &phone),
        Command::UpdateSite { id, name, manager, phone } => {
            sites::update_site(session, id, &name, &manager, &phone)
        }
        Command::DeleteSite { id } => sites::delete_site(session, id),
        Command::UseSite { site } => sites::use_site(session, &site),
        Command::Save => records::save_record(session),
        Command::Records { site, from, to } => records::query_records(session, site, from, to),
        Command::EditRecord { id, site, with_helmet, without_helmet } => {
            records::edit_record(session, id, site, with_helmet, without_helmet)
        }
        Command::DeleteRecord { id } => records::delete_record(session, id),
        Command::View { id } => records::view_image(session, id),
        Command::Warnings { threshold } => warnings::check_warnings(session, threshold),
        Command::Stats { site_id, days } => warnings::site_statistics(session, site_id, days),
        Command::Inspect { path, out } => media::inspect(session, &path, out.as_deref()),
        Command::Config { threshold, log_level } => config::show_or_update(threshold, log_level),
        Command::Quit => Ok(String::new()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::detection::annotate::Annotator;
    use crate::detection::backend::{Prediction, StubBackend};

    /// 内存数据库 + 测试后端的会话，截图写到临时目录
    pub fn session(predictions: Vec<Prediction>) -> (Session, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let detector = HelmetDetector::new(
            Box::new(StubBackend::new(predictions)),
            Annotator::without_font(),
            &DetectionConfig::default(),
        );
        let session = Session::new(store, dir.path().to_path_buf(), dir.path().join("captured_images"))
            .with_detector(detector);
        (session, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        ConsoleLine::try_parse_from(split_line(line)).unwrap().command
    }

    #[test]
    fn test_split_line_keeps_quoted_arguments() {
        assert_eq!(
            split_line(r#"add-site "East Gate" 张三  13800000000"#),
            vec!["add-site", "East Gate", "张三", "13800000000"]
        );
        assert_eq!(split_line(r#"use-site """#), vec!["use-site", ""]);
        assert!(split_line("   ").is_empty());
    }

    #[test]
    fn test_console_lines_parse_into_commands() {
        assert_eq!(parse("step"), Command::Step { count: 1 });
        assert_eq!(parse("play --frames 5"), Command::Play { frames: Some(5) });
        assert_eq!(parse("exit"), Command::Quit);
        assert_eq!(
            parse("records --site east --from 2024-01-01"),
            Command::Records {
                site: Some("east".into()),
                from: NaiveDate::from_ymd_opt(2024, 1, 1),
                to: None,
            }
        );
        assert_eq!(
            parse("edit-record 3 --with 4 --without 1"),
            Command::EditRecord { id: 3, site: None, with_helmet: 4, without_helmet: 1 }
        );
    }

    #[test]
    fn test_bad_console_lines_are_rejected() {
        assert!(ConsoleLine::try_parse_from(split_line("add-site only-name")).is_err());
        assert!(ConsoleLine::try_parse_from(split_line("records --from yesterday")).is_err());
        assert!(ConsoleLine::try_parse_from(split_line("frobnicate")).is_err());
    }

    #[test]
    fn test_cli_global_data_dir() {
        let cli = Cli::try_parse_from(["hardhat-monitor", "sites", "--data-dir", "/tmp/x"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        assert_eq!(cli.command, Some(Command::Sites));

        let cli = Cli::try_parse_from(["hardhat-monitor"]).unwrap();
        assert!(cli.command.is_none());
    }
}
