use crate::core::{PlayerError, Result, VideoFrame};
use crate::player::demuxer_source::{AudioStream, VideoStream};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, software, util};
use log::{debug, info, warn};
use std::collections::VecDeque;

fn rational_to_f64(r: ffmpeg::Rational) -> Option<f64> {
    if r.numerator() == 0 || r.denominator() == 0 {
        None
    } else {
        Some(r.numerator() as f64 / r.denominator() as f64)
    }
}

/// 视频流（软件解码，输出 RGBA）
pub struct FfmpegVideoStream {
    index: usize,
    parameters: codec::Parameters,
    frame_rate: Option<f64>,
    decoder: Option<codec::decoder::Video>,
    scaler: Option<software::scaling::Context>,
    pending: VecDeque<VideoFrame>,
}

// SwsContext 本身不是 Send，但我们确保只在单个线程中使用它
// 这是安全的，因为每个流实例只会在解封装线程中使用
unsafe impl Send for FfmpegVideoStream {}

impl FfmpegVideoStream {
    pub fn new(stream: &format::stream::Stream) -> Self {
        Self {
            index: stream.index(),
            parameters: stream.parameters(),
            frame_rate: rational_to_f64(stream.avg_frame_rate()),
            decoder: None,
            scaler: None,
            pending: VecDeque::new(),
        }
    }
}

/// 转换帧格式为紧密排列的 RGBA
fn convert_video_frame(
    scaler: &mut Option<software::scaling::Context>,
    frame: &util::frame::Video,
) -> Result<VideoFrame> {
    let width = frame.width();
    let height = frame.height();

    // 初始化 scaler（YUV -> RGBA）
    if scaler.is_none() {
        *scaler = Some(software::scaling::Context::get(
            frame.format(),
            width,
            height,
            util::format::Pixel::RGBA,
            width,
            height,
            software::scaling::Flags::BILINEAR,
        )?);
    }
    let Some(scaler) = scaler.as_mut() else {
        return Err(PlayerError::DecodeError("无法创建像素格式转换器".to_string()));
    };

    let mut rgba_frame = util::frame::Video::empty();
    scaler.run(frame, &mut rgba_frame)?;

    // 复制数据到连续内存
    let row_size = width as usize * 4;
    let mut data = vec![0u8; row_size * height as usize];
    let stride = rgba_frame.stride(0);
    let frame_data = rgba_frame.data(0);

    for y in 0..height as usize {
        let src_offset = y * stride;
        let dst_offset = y * row_size;
        data[dst_offset..dst_offset + row_size]
            .copy_from_slice(&frame_data[src_offset..src_offset + row_size]);
    }

    Ok(VideoFrame::rgba(width, height, data))
}

impl VideoStream for FfmpegVideoStream {
    type Packet = ffmpeg::Packet;

    fn open(&mut self) -> Result<()> {
        let context = codec::context::Context::from_parameters(self.parameters.clone())?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| PlayerError::StreamOpenError(format!("视频流 #{}: {}", self.index, e)))?;

        info!(
            "视频流已打开: #{} {}x{}, 格式: {:?}, 帧率: {:?}",
            self.index,
            decoder.width(),
            decoder.height(),
            decoder.format(),
            self.frame_rate
        );

        self.decoder = Some(decoder);
        Ok(())
    }

    fn close(&mut self) {
        if self.decoder.take().is_some() {
            self.scaler = None;
            self.pending.clear();
            debug!("视频流已关闭: #{}", self.index);
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn dimensions(&self) -> (u32, u32) {
        self.decoder
            .as_ref()
            .map(|d| (d.width(), d.height()))
            .unwrap_or((0, 0))
    }

    fn read_video_frame(&mut self, packet: &ffmpeg::Packet) -> Result<Option<VideoFrame>> {
        let Self {
            decoder,
            scaler,
            pending,
            ..
        } = self;
        let decoder = decoder
            .as_mut()
            .ok_or_else(|| PlayerError::DecodeError("视频流未打开".to_string()))?;

        match decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器收到 EOF（send_packet），忽略本次包");
            }
            Err(e) => return Err(e.into()),
        }
        receive_video_frames(decoder, scaler, pending)?;

        // 一个包偶尔会产出多帧，多余的帧留到下一次交付
        Ok(pending.pop_front())
    }

    fn drain(&mut self) -> Result<Vec<VideoFrame>> {
        let Self {
            decoder,
            scaler,
            pending,
            ..
        } = self;
        let decoder = decoder
            .as_mut()
            .ok_or_else(|| PlayerError::DecodeError("视频流未打开".to_string()))?;

        // 送入 EOF，取出因重排序延迟滞留在解码器中的帧
        match decoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => {}
            Err(e) => return Err(e.into()),
        }
        receive_video_frames(decoder, scaler, pending)?;
        decoder.flush();

        debug!("视频解码器刷新完成，剩余 {} 帧", pending.len());
        Ok(pending.drain(..).collect())
    }
}

fn receive_video_frames(
    decoder: &mut codec::decoder::Video,
    scaler: &mut Option<software::scaling::Context>,
    pending: &mut VecDeque<VideoFrame>,
) -> Result<()> {
    loop {
        let mut decoded_frame = util::frame::Video::empty();
        match decoder.receive_frame(&mut decoded_frame) {
            Ok(()) => pending.push_back(convert_video_frame(scaler, &decoded_frame)?),
            Err(ffmpeg::Error::Other { errno: 11 }) => return Ok(()), // EAGAIN
            Err(ffmpeg::Error::Eof) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

/// 音频流（重采样为立体声 f64 交错）
pub struct FfmpegAudioStream {
    index: usize,
    parameters: codec::Parameters,
    decoder: Option<codec::decoder::Audio>,
    resampler: Option<software::resampling::Context>,
    target_sample_rate: u32,
}

// SwrContext 同样只在解封装线程中使用
unsafe impl Send for FfmpegAudioStream {}

impl FfmpegAudioStream {
    pub fn new(stream: &format::stream::Stream) -> Self {
        Self {
            index: stream.index(),
            parameters: stream.parameters(),
            decoder: None,
            resampler: None,
            target_sample_rate: 0,
        }
    }

    /// 重采样一帧并以小端字节追加到负载
    fn append_frame(&mut self, frame: &util::frame::Audio, payload: &mut Vec<u8>) -> Result<()> {
        let layout = if frame.channel_layout().is_empty() {
            util::channel_layout::ChannelLayout::default(frame.channels() as i32)
        } else {
            frame.channel_layout()
        };

        // 初始化 resampler（声道转换 + 重采样）
        if self.resampler.is_none() {
            debug!(
                "🔧 初始化音频重采样器: {}Hz/{}ch → {}Hz/2ch f64",
                frame.rate(),
                frame.channels(),
                self.target_sample_rate
            );
            self.resampler = Some(software::resampling::Context::get(
                frame.format(),
                layout,
                frame.rate(),
                util::format::Sample::F64(util::format::sample::Type::Packed),
                util::channel_layout::ChannelLayout::STEREO,
                self.target_sample_rate,
            )?);
        }
        let Some(resampler) = self.resampler.as_mut() else {
            return Err(PlayerError::DecodeError("无法创建音频重采样器".to_string()));
        };

        let mut resampled = util::frame::Audio::empty();
        resampler.run(frame, &mut resampled)?;
        append_le_bytes(&resampled, payload);
        Ok(())
    }

    /// 取出重采样器内部缓存的尾部采样
    fn flush_resampler(&mut self, payload: &mut Vec<u8>) -> Result<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };
        let delayed = resampler
            .delay()
            .map_or(0, |delay| delay.output.max(0) as usize);
        if delayed == 0 {
            return Ok(());
        }

        let mut tail = util::frame::Audio::new(
            util::format::Sample::F64(util::format::sample::Type::Packed),
            delayed,
            util::channel_layout::ChannelLayout::STEREO,
        );
        resampler.flush(&mut tail)?;
        debug!("🔧 音频重采样器刷新：{} 个尾部采样", tail.samples());
        append_le_bytes(&tail, payload);
        Ok(())
    }
}

/// 把 packed 立体声 f64 帧按小端字节追加到负载
fn append_le_bytes(frame: &util::frame::Audio, payload: &mut Vec<u8>) {
    // data(0) 可能带有对齐填充，只取有效部分
    let byte_len = frame.samples() * 2 * 8;
    let data = frame.data(0);
    let data = &data[..byte_len.min(data.len())];

    payload.reserve(data.len());
    for chunk in data.chunks_exact(8) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        payload.extend_from_slice(&f64::from_ne_bytes(buf).to_le_bytes());
    }
}

fn receive_audio_frames(decoder: &mut codec::decoder::Audio) -> Result<Vec<util::frame::Audio>> {
    let mut decoded_frames = Vec::new();
    loop {
        let mut decoded_frame = util::frame::Audio::empty();
        match decoder.receive_frame(&mut decoded_frame) {
            Ok(()) => decoded_frames.push(decoded_frame),
            Err(ffmpeg::Error::Other { errno: 11 }) => return Ok(decoded_frames), // EAGAIN
            Err(ffmpeg::Error::Eof) => return Ok(decoded_frames),
            Err(e) => return Err(e.into()),
        }
    }
}

impl AudioStream for FfmpegAudioStream {
    type Packet = ffmpeg::Packet;

    fn open(&mut self) -> Result<()> {
        let context = codec::context::Context::from_parameters(self.parameters.clone())?;
        let decoder = context
            .decoder()
            .audio()
            .map_err(|e| PlayerError::StreamOpenError(format!("音频流 #{}: {}", self.index, e)))?;

        info!(
            "音频流已打开: #{} {} Hz, {} 声道, 格式: {:?}",
            self.index,
            decoder.rate(),
            decoder.channels(),
            decoder.format()
        );

        if self.target_sample_rate == 0 {
            self.target_sample_rate = decoder.rate();
        }
        self.decoder = Some(decoder);
        Ok(())
    }

    fn close(&mut self) {
        if self.decoder.take().is_some() {
            self.resampler = None;
            debug!("音频流已关闭: #{}", self.index);
        }
    }

    fn sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    fn set_output_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.target_sample_rate {
            warn!(
                "⚠️  音频输出采样率调整: {} Hz → {} Hz",
                self.target_sample_rate, sample_rate
            );
            self.target_sample_rate = sample_rate;
            self.resampler = None;
        }
    }

    fn read_audio_frame(&mut self, packet: &ffmpeg::Packet) -> Result<Option<Vec<u8>>> {
        let decoded_frames = {
            let decoder = self
                .decoder
                .as_mut()
                .ok_or_else(|| PlayerError::DecodeError("音频流未打开".to_string()))?;

            match decoder.send_packet(packet) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    debug!("音频解码器收到 EOF（send_packet），忽略本次包");
                }
                Err(e) => return Err(e.into()),
            }
            receive_audio_frames(decoder)?
        };

        let mut payload = Vec::new();
        for frame in &decoded_frames {
            self.append_frame(frame, &mut payload)?;
        }

        Ok(if payload.is_empty() { None } else { Some(payload) })
    }

    fn drain(&mut self) -> Result<Option<Vec<u8>>> {
        let decoded_frames = {
            let decoder = self
                .decoder
                .as_mut()
                .ok_or_else(|| PlayerError::DecodeError("音频流未打开".to_string()))?;

            match decoder.send_eof() {
                Ok(()) | Err(ffmpeg::Error::Eof) => {}
                Err(e) => return Err(e.into()),
            }
            let frames = receive_audio_frames(decoder)?;
            decoder.flush();
            frames
        };

        let mut payload = Vec::new();
        for frame in &decoded_frames {
            self.append_frame(frame, &mut payload)?;
        }
        self.flush_resampler(&mut payload)?;

        debug!("音频解码器刷新完成：{} 帧，{} 字节", decoded_frames.len(), payload.len());
        Ok(if payload.is_empty() { None } else { Some(payload) })
    }
}
