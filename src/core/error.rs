use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无法打开文件: {0}")]
    OpenError(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("无法找到音频流")]
    NoAudioStream,

    #[error("无法打开流: {0}")]
    StreamOpenError(String),

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;

/// 错误来源阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    Read,
    VideoDecode,
    AudioDecode,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Read => "读取",
            ErrorStage::VideoDecode => "视频解码",
            ErrorStage::AudioDecode => "音频解码",
        }
    }
}

/// 运行期可恢复错误（经 ErrorSink 异步上报）
#[derive(Debug)]
pub struct ErrorEvent {
    pub stage: ErrorStage,
    pub error: PlayerError,
}

impl ErrorEvent {
    pub fn new(stage: ErrorStage, error: PlayerError) -> Self {
        Self { stage, error }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage.as_str(), self.error)
    }
}
