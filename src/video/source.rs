// 帧来源：静态图片、视频文件、摄像头

use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout};
use image::RgbImage;
use tracing::{info, warn};
use crate::config::PlaybackConfig;
use crate::error::{AppError, AppResult};
use crate::video::ffmpeg;

/// 一路 ffmpeg 原始帧流
pub struct StreamSource {
    label: String,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    width: u32,
    height: u32,
    frames_read: u64,
    camera: bool,
}

pub enum FrameSource {
    /// 单张图片，只产出一帧
    Still { label: String, frame: Option<RgbImage> },
    Stream(StreamSource),
}

impl FrameSource {
    pub fn open_image(path: &Path) -> AppResult<Self> {
        let frame = image::open(path)?.to_rgb8();
        info!("[SOURCE] 打开图片: {} ({}x{})", path.display(), frame.width(), frame.height());
        Ok(FrameSource::Still {
            label: path.display().to_string(),
            frame: Some(frame),
        })
    }

    pub fn open_video(path: &Path) -> AppResult<Self> {
        let path_str = path.to_string_lossy().to_string();
        let info = ffmpeg::get_video_info(&path_str)?;
        let (width, height) = info.output_dimensions();
        info!(
            "[SOURCE] 打开视频: {} ({}, {}x{}, 旋转 {}, {:.2} fps, {:.1}s)",
            info.path, info.video_codec, width, height, info.rotation, info.fps, info.duration
        );
        let args = ffmpeg::file_decode_args(&path_str);
        StreamSource::spawn(path_str, &args, width, height, false).map(FrameSource::Stream)
    }

    pub fn open_camera(index: u32, playback: &PlaybackConfig) -> AppResult<Self> {
        let (w, h) = (playback.camera_width, playback.camera_height);
        if w == 0 || h == 0 {
            return Err(AppError::Config(format!("摄像头分辨率无效: {}x{}", w, h)));
        }
        info!("[SOURCE] 打开摄像头 {} ({}x{})", index, w, h);
        let args = ffmpeg::camera_decode_args(index, w, h);
        StreamSource::spawn(format!("camera:{}", index), &args, w, h, true).map(FrameSource::Stream)
    }

    pub fn label(&self) -> &str {
        match self {
            FrameSource::Still { label, .. } => label,
            FrameSource::Stream(s) => &s.label,
        }
    }

    pub fn is_camera(&self) -> bool {
        matches!(self, FrameSource::Stream(s) if s.camera)
    }

    /// 读取下一帧，结束时返回 None
    pub fn next_frame(&mut self) -> AppResult<Option<RgbImage>> {
        match self {
            FrameSource::Still { frame, .. } => Ok(frame.take()),
            FrameSource::Stream(s) => s.next_frame(),
        }
    }

    pub fn close(&mut self) {
        if let FrameSource::Stream(s) = self {
            s.close();
        }
    }
}

impl StreamSource {
    fn spawn(label: String, args: &[String], width: u32, height: u32, camera: bool) -> AppResult<Self> {
        let mut child = ffmpeg::spawn_decoder(args)?;
        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AppError::FFmpeg("无法获取 FFmpeg 输出流".to_string()));
            }
        };

        Ok(Self {
            label,
            child: Some(child),
            stdout: Some(stdout),
            width,
            height,
            frames_read: 0,
            camera,
        })
    }

    fn next_frame(&mut self) -> AppResult<Option<RgbImage>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        match read_frame(stdout, self.width, self.height) {
            Ok(Some(frame)) => {
                self.frames_read += 1;
                Ok(Some(frame))
            }
            Ok(None) => {
                info!("[SOURCE] {} 读取结束，共 {} 帧", self.label, self.frames_read);
                self.close();
                Ok(None)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// 结束解码进程并回收
    fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    warn!("[SOURCE] 结束 ffmpeg 进程失败: {}", e);
                }
            }
            let _ = child.wait();
            info!("[SOURCE] 已关闭 {}", self.label);
        }
    }
}

impl Drop for StreamSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// 从原始 rgb24 流读取一整帧；流在帧边界结束时返回 None
pub fn read_frame<R: Read>(reader: &mut R, width: u32, height: u32) -> AppResult<Option<RgbImage>> {
    let frame_len = width as usize * height as usize * 3;
    let mut buf = vec![0u8; frame_len];
    let mut filled = 0;

    while filled < frame_len {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if filled == 0 {
        return Ok(None);
    }
    if filled < frame_len {
        warn!("[SOURCE] 最后一帧不完整 ({}/{} 字节)，丢弃", filled, frame_len);
        return Ok(None);
    }

    Ok(RgbImage::from_raw(width, height, buf))
}
