// 播放器核心模块：解封装 → 解码 → 有界队列 → {帧节拍器, 音频拉取}

pub mod demuxer;
pub mod demuxer_source;  // MediaSource 抽象接口
pub mod demuxer_thread;  // 解封装循环与关闭顺序
pub mod decoder;
pub mod error_sink;
pub mod audio_pull;
pub mod audio_output;
pub mod frame_pacer;
pub mod manager;

#[cfg(test)]
pub(crate) mod test_source;

pub use demuxer::FfmpegSource;
pub use demuxer_source::{MediaSource, PreparedMedia};
pub use audio_output::AudioOutput;
pub use frame_pacer::DisplayBuffer;
pub use manager::{PlaybackController, PlaybackPipeline};
