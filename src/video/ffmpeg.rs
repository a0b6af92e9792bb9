// FFmpeg 封装
//
// ffprobe 读取视频尺寸与帧率，ffmpeg 把视频文件或摄像头解码成 rgb24 原始帧写到 stdout

use crate::error::{AppError, AppResult};
use crate::utils::{hidden_command, resolve_tool_path};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Child, Stdio};
use tracing::{error, info};

/// 视频基本信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    pub video_codec: String,
    /// 旋转元数据（度），ffmpeg 输出时会自动旋转
    pub rotation: i32,
}

impl VideoInfo {
    /// ffmpeg 自动旋转后实际输出的帧尺寸
    pub fn output_dimensions(&self) -> (u32, u32) {
        if self.rotation.rem_euclid(180) == 90 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// 获取视频信息
pub fn get_video_info(video_path: &str) -> AppResult<VideoInfo> {
    if !Path::new(video_path).exists() {
        return Err(AppError::NotFound(format!("视频文件不存在: {}", video_path)));
    }

    let ffprobe_path = resolve_tool_path("ffprobe");
    let output = hidden_command(&ffprobe_path)
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
            video_path,
        ])
        .output()
        .map_err(|e| AppError::FFmpeg(format!("ffprobe 执行失败: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::FFmpeg(format!("ffprobe 错误: {}", stderr)));
    }

    parse_probe_output(video_path, &String::from_utf8_lossy(&output.stdout))
}

/// 解析 ffprobe 的 JSON 输出，取第一条视频流
fn parse_probe_output(video_path: &str, stdout: &str) -> AppResult<VideoInfo> {
    let json: serde_json::Value = serde_json::from_str(stdout)
        .map_err(|e| AppError::FFmpeg(format!("解析 ffprobe 输出失败: {}", e)))?;

    let streams = json["streams"].as_array()
        .ok_or_else(|| AppError::FFmpeg("无法获取流信息".to_string()))?;

    let stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or_else(|| AppError::FFmpeg(format!("文件中没有视频流: {}", video_path)))?;

    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(AppError::FFmpeg(format!("无法获取视频尺寸: {}", video_path)));
    }

    let fps = stream["r_frame_rate"].as_str().map(parse_frame_rate).unwrap_or(0.0);
    let duration = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoInfo {
        path: video_path.to_string(),
        width,
        height,
        fps,
        duration,
        video_codec: stream["codec_name"].as_str().unwrap_or("").to_string(),
        rotation: parse_rotation(stream),
    })
}

/// 旋转角度：新版 ffprobe 在 side_data_list 中给出，旧版在 tags.rotate
fn parse_rotation(stream: &serde_json::Value) -> i32 {
    let from_side_data = stream["side_data_list"]
        .as_array()
        .and_then(|list| list.iter().find_map(|d| d["rotation"].as_f64()));
    let from_tags = stream["tags"]["rotate"]
        .as_str()
        .and_then(|s| s.trim().parse::<f64>().ok());

    from_side_data
        .or(from_tags)
        .map(|deg| deg.round() as i32)
        .unwrap_or(0)
}

/// 解析帧率字符串
fn parse_frame_rate(fps_str: &str) -> f64 {
    let parts: Vec<&str> = fps_str.split('/').collect();
    if parts.len() == 2 {
        let num: f64 = parts[0].parse().unwrap_or(0.0);
        let den: f64 = parts[1].parse().unwrap_or(1.0);
        if den > 0.0 {
            return num / den;
        }
    }
    fps_str.parse().unwrap_or(0.0)
}

/// rgb24 原始帧输出参数
fn rawvideo_output_args(args: &mut Vec<String>) {
    args.extend(
        ["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]
            .iter()
            .map(|s| s.to_string()),
    );
}

/// 视频文件解码参数，按原始尺寸输出
pub fn file_decode_args(video_path: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-i", video_path]
        .iter()
        .map(|s| s.to_string())
        .collect();
    rawvideo_output_args(&mut args);
    args
}

/// 摄像头解码参数，输入格式按系统选择，输出尺寸强制缩放到 width x height
pub fn camera_decode_args(index: u32, width: u32, height: u32) -> Vec<String> {
    let (format, device) = camera_input(index);
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-f"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(format.to_string());
    args.push("-i".to_string());
    args.push(device);
    args.push("-vf".to_string());
    args.push(format!("scale={}:{}", width, height));
    rawvideo_output_args(&mut args);
    args
}

#[cfg(target_os = "linux")]
fn camera_input(index: u32) -> (&'static str, String) {
    ("v4l2", format!("/dev/video{}", index))
}

#[cfg(target_os = "windows")]
fn camera_input(index: u32) -> (&'static str, String) {
    // dshow 按设备名打开，这里以编号作为设备名
    ("dshow", format!("video={}", index))
}

#[cfg(target_os = "macos")]
fn camera_input(index: u32) -> (&'static str, String) {
    ("avfoundation", format!("{}:none", index))
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
fn camera_input(index: u32) -> (&'static str, String) {
    ("v4l2", format!("/dev/video{}", index))
}

/// 启动 ffmpeg 解码进程，stdout 为原始帧
pub fn spawn_decoder(args: &[String]) -> AppResult<Child> {
    let ffmpeg_path = resolve_tool_path("ffmpeg");
    info!("[FFMPEG] 启动解码: {} {}", ffmpeg_path, args.join(" "));

    hidden_command(&ffmpeg_path)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            error!("[FFMPEG] ffmpeg 启动失败: {}", e);
            AppError::FFmpeg(format!("ffmpeg 启动失败: {}", e))
        })
}
