// 图片/视频/摄像头命令

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use crate::commands::Session;
use crate::config;
use crate::error::{AppError, AppResult};
use crate::detection::Detection;
use crate::video::FrameSource;

fn format_counts(detection: &Detection) -> String {
    format!(
        "总人数: {}  佩戴安全帽: {}  未佩戴安全帽: {}",
        detection.total_people(), detection.with_helmet(), detection.without_helmet()
    )
}

/// 打开图片并立即检测；会先关闭正在播放的视频或摄像头
pub fn open_image(session: &mut Session, path: &Path) -> AppResult<String> {
    session.close_source();
    let mut source = FrameSource::open_image(path)
        .map_err(|e| AppError::Warning(format!("无法加载图片 {}: {}", path.display(), e)))?;
    let frame = source.next_frame()?;

    let detection = session.detector()?.detect_frame(frame)?;
    let text = format!("{}\n{}", path.display(), format_counts(&detection));
    session.current = Some(detection);
    Ok(text)
}

/// 打开视频文件，之后用 play/step 逐帧检测
pub fn open_video(session: &mut Session, path: &Path) -> AppResult<String> {
    session.close_source();
    let source = FrameSource::open_video(path)?;
    let label = source.label().to_string();
    session.source = Some(source);
    Ok(format!("已打开视频: {}，使用 play 或 step 开始检测", label))
}

/// 摄像头开关：已打开则关闭，否则打开指定编号（默认取配置）
pub fn toggle_camera(session: &mut Session, index: Option<u32>) -> AppResult<String> {
    if session.source.as_ref().map(|s| s.is_camera()).unwrap_or(false) {
        session.close_source();
        return Ok("摄像头已关闭".to_string());
    }

    session.close_source();
    let playback = config::get_config().playback;
    let index = index.unwrap_or(playback.camera_index);
    let source = FrameSource::open_camera(index, &playback)
        .map_err(|e| AppError::Warning(format!("无法打开摄像头 {}: {}", index, e)))?;
    session.source = Some(source);
    Ok(format!("摄像头 {} 已打开，使用 play 开始检测", index))
}

pub fn close(session: &mut Session) -> AppResult<String> {
    if session.close_source() {
        Ok("已关闭".to_string())
    } else {
        Ok("没有打开的视频或摄像头".to_string())
    }
}

/// 读取并检测一帧；来源结束时关闭来源并返回 false
fn advance(session: &mut Session) -> AppResult<bool> {
    let source = session
        .source
        .as_mut()
        .ok_or_else(|| AppError::Warning("请先打开视频或摄像头".to_string()))?;

    let frame = match source.next_frame()? {
        Some(frame) => frame,
        None => {
            session.close_source();
            return Ok(false);
        }
    };

    let detection = session.detector()?.detect_frame(Some(frame))?;
    session.current = Some(detection);
    Ok(true)
}

/// 不等待间隔，连续检测 count 帧
pub fn step(session: &mut Session, count: u64) -> AppResult<String> {
    if count == 0 {
        return Err(AppError::InvalidArgument("帧数必须大于 0".to_string()));
    }
    let mut processed = 0;
    while processed < count {
        if !advance(session)? {
            break;
        }
        processed += 1;
    }
    Ok(summary(session, processed))
}

/// 按配置的帧间隔连续检测，直到来源结束、达到帧数或按下 Ctrl-C
pub fn play(session: &mut Session, frames: Option<u64>) -> AppResult<String> {
    if session.source.is_none() {
        return Err(AppError::Warning("请先打开视频或摄像头".to_string()));
    }

    let interval = Duration::from_millis(config::get_config().playback.frame_interval_ms);
    session.stop.store(false, Ordering::SeqCst);
    session.playing.store(true, Ordering::SeqCst);
    info!("[SESSION] 开始播放，间隔 {:?}", interval);

    let result = play_loop(session, frames, interval);

    session.playing.store(false, Ordering::SeqCst);
    let processed = result?;
    let paused = session.stop.swap(false, Ordering::SeqCst);
    let mut text = summary(session, processed);
    if paused {
        text.push_str("\n已暂停，使用 play 继续");
    }
    Ok(text)
}

fn play_loop(session: &mut Session, frames: Option<u64>, interval: Duration) -> AppResult<u64> {
    let mut processed = 0;
    loop {
        if session.stop.load(Ordering::SeqCst) || frames.map(|n| processed >= n).unwrap_or(false) {
            break;
        }

        let started = Instant::now();
        if !advance(session)? {
            break;
        }
        processed += 1;

        if let Some(detection) = &session.current {
            println!("[{:>5}] {}", processed, format_counts(detection));
        }

        let elapsed = started.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        } else {
            debug!("[SESSION] 单帧耗时 {:?} 超过间隔", elapsed);
        }
    }
    Ok(processed)
}

fn summary(session: &Session, processed: u64) -> String {
    let mut lines = vec![format!("已检测 {} 帧", processed)];
    if let Some(detection) = &session.current {
        lines.push(format!("最新一帧 {}", format_counts(detection)));
    }
    if session.source.is_none() {
        lines.push("视频已结束".to_string());
    }
    lines.join("\n")
}

/// 通用多类别检测，列出每个目标的类别、置信度和位置
pub fn inspect(session: &mut Session, path: &Path, out: Option<&Path>) -> AppResult<String> {
    let frame = image::open(path)
        .map_err(|e| AppError::Warning(format!("无法加载图片 {}: {}", path.display(), e)))?
        .to_rgb8();

    let (predictions, annotated) = session.detector()?.inspect(frame)?;

    let mut lines = vec![format!("{}: {} 个目标", path.display(), predictions.len())];
    for (i, p) in predictions.iter().enumerate() {
        let b = &p.prediction;
        lines.push(format!(
            "{:>3}. {:<16} {:.2}  ({:.0}, {:.0}) - ({:.0}, {:.0})",
            i + 1, p.class_name, b.score, b.x1, b.y1, b.x2, b.y2
        ));
    }

    if let Some(out) = out {
        annotated.save(out)?;
        lines.push(format!("标注图已保存: {}", out.display()));
    }
    Ok(lines.join("\n"))
}
