use crate::core::{PlayerError, Result, SamplePair};
use crate::player::audio_pull::AudioPullAdapter;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 音频输出 - 使用 cpal 播放，设备回调从 AudioPullAdapter 拉取采样
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    finished: Arc<AtomicBool>,
}

impl AudioOutput {
    /// 初始化音频输出（不支持的配置会自动回退）
    ///
    /// `buffer_frames` 为 None 时使用设备默认缓冲大小。
    pub fn new(sample_rate: u32, buffer_frames: Option<u32>) -> Result<Self> {
        info!("初始化音频输出: {} Hz, 立体声", sample_rate);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let buffer_size = match buffer_frames {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        };

        // 先尝试源采样率，再尝试常见配置
        let candidates = [
            (sample_rate, 2),
            (48000, 2),  // 最常见
            (44100, 2),  // CD 音质
            (48000, 1),
            (44100, 1),
        ];

        let mut chosen = None;
        for (rate, channels) in candidates {
            let candidate = StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(rate),
                buffer_size: buffer_size.clone(),
            };
            if Self::is_supported(&device, &candidate)? {
                chosen = Some(candidate);
                break;
            }
        }

        let config = chosen.ok_or_else(|| {
            PlayerError::AudioError(format!(
                "音频设备不支持任何标准配置 (原请求: {} Hz, 立体声)",
                sample_rate
            ))
        })?;

        if config.sample_rate.0 != sample_rate || config.channels != 2 {
            warn!(
                "⚠️  音频设备不支持 {} Hz 立体声，回退到 {} Hz, {} 声道",
                sample_rate, config.sample_rate.0, config.channels
            );
        }

        Ok(Self {
            device,
            config,
            stream: None,
            finished: Arc::new(AtomicBool::new(false)),
        })
    }

    fn is_supported(device: &Device, config: &StreamConfig) -> Result<bool> {
        let supported_configs = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;

        Ok(supported_configs
            .into_iter()
            .any(|supported| Self::is_config_compatible(config, &supported)))
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        rate_in_range && config.channels == supported.channels()
    }

    /// 实际使用的采样率
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// 开始播放，由设备回调驱动拉取
    pub fn play(&mut self, mut adapter: AudioPullAdapter) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        debug!("音频启动时已缓冲 {} 个采样对", adapter.buffered());
        let channels = self.config.channels as usize;
        let finished = self.finished.clone();
        let mut scratch: Vec<SamplePair> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if finished.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }

                    let frames = data.len() / channels;
                    scratch.resize(frames, SamplePair::SILENCE);
                    let result = adapter.pull(&mut scratch[..frames]);
                    if !result.more {
                        info!("🔚 音频采样已播放完毕");
                        finished.store(true, Ordering::Relaxed);
                    }

                    for (i, out) in data.chunks_mut(channels).enumerate() {
                        let pair = if i < result.filled {
                            scratch[i]
                        } else {
                            SamplePair::SILENCE
                        };
                        write_pair(out, pair);
                    }
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动");

        Ok(())
    }

    /// 采样队列是否已经播放完毕
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    /// 停止播放
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 把一个立体声采样写入设备帧（单声道取平均，多余声道静音）
fn write_pair(out: &mut [f32], pair: SamplePair) {
    match out.len() {
        0 => {}
        1 => out[0] = ((pair.left + pair.right) * 0.5) as f32,
        _ => {
            out[0] = pair.left as f32;
            out[1] = pair.right as f32;
            out[2..].fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_pair_channel_mapping() {
        let pair = SamplePair::new(0.5, -0.25);

        let mut mono = [1.0f32; 1];
        write_pair(&mut mono, pair);
        assert_eq!(mono, [0.125]);

        let mut stereo = [0.0f32; 2];
        write_pair(&mut stereo, pair);
        assert_eq!(stereo, [0.5, -0.25]);

        let mut surround = [1.0f32; 6];
        write_pair(&mut surround, pair);
        assert_eq!(surround, [0.5, -0.25, 0.0, 0.0, 0.0, 0.0]);
    }
}
