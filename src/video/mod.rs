// 视频模块
//
// 子模块：
// - ffmpeg: ffprobe/ffmpeg 子进程封装
// - source: 图片、视频文件、摄像头帧来源

pub mod ffmpeg;
pub mod source;

pub use source::FrameSource;
