use crate::core::{PlayerError, Result};
use log::info;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 流水线配置
///
/// 可从 TOML 文件加载，缺省字段取默认值：
///
/// ```toml
/// video_queue_capacity = 16
/// audio_queue_capacity = 16384
/// fallback_frame_rate = 60.0
///
/// [error_policy]
/// max_consecutive_errors = 50
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 视频帧队列容量（帧）
    pub video_queue_capacity: usize,
    /// 音频采样队列容量（立体声采样对）
    pub audio_queue_capacity: usize,
    /// 错误通道容量，满时丢弃最旧的错误
    pub error_queue_capacity: usize,
    /// 源未报告帧率时使用的帧率
    pub fallback_frame_rate: f64,
    /// 暂停时音频拉取的轮询间隔（毫秒）
    pub pause_poll_interval_ms: u64,
    /// 音频后端缓冲大小（帧），None 表示使用设备默认值
    pub audio_buffer_frames: Option<u32>,
    /// 打开成功后是否自动播放
    pub autoplay: bool,
    pub error_policy: ErrorPolicy,
}

/// 连续错误处理策略
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErrorPolicy {
    /// 连续失败达到该次数后终止解封装循环；None 表示永不因错误终止
    pub max_consecutive_errors: Option<u32>,
}

impl ErrorPolicy {
    pub fn should_terminate(&self, consecutive_errors: u32) -> bool {
        matches!(self.max_consecutive_errors, Some(max) if consecutive_errors >= max)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_queue_capacity: 16,
            audio_queue_capacity: 16384,
            error_queue_capacity: 32,
            fallback_frame_rate: 60.0,
            pause_poll_interval_ms: 8,
            audio_buffer_frames: None,
            autoplay: true,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// 从 TOML 文件加载配置
    pub fn load(path: &Path) -> Result<Self> {
        info!("加载配置文件: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| PlayerError::ConfigError(format!("解析 TOML 失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.video_queue_capacity == 0 || self.audio_queue_capacity == 0 {
            return Err(PlayerError::ConfigError("队列容量必须大于 0".to_string()));
        }
        if self.error_queue_capacity == 0 {
            return Err(PlayerError::ConfigError("错误通道容量必须大于 0".to_string()));
        }
        if !(self.fallback_frame_rate > 0.0) {
            return Err(PlayerError::ConfigError(format!(
                "回退帧率无效: {}",
                self.fallback_frame_rate
            )));
        }
        if self.pause_poll_interval_ms == 0 {
            return Err(PlayerError::ConfigError("暂停轮询间隔必须大于 0".to_string()));
        }
        Ok(())
    }

    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms)
    }
}
