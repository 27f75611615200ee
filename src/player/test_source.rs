//! 测试用的脚本化媒体源

use crate::core::{MediaPacket, PlayerError, Result, SamplePair, StreamKind, VideoFrame};
use crate::player::demuxer_source::{AudioStream, MediaSource, VideoStream};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// 视频包负载中的该字节表示解码失败
pub const CORRUPT: u8 = 0xFF;

#[derive(Debug, Clone)]
pub enum Step {
    Packet(StreamKind, Vec<u8>),
    ReadError,
}

/// 视频包：非空负载解码为 1x1 帧，像素值即负载首字节
pub fn video(tag: u8) -> Step {
    Step::Packet(StreamKind::Video, vec![tag])
}

/// 不产出帧的视频包
pub fn empty_video() -> Step {
    Step::Packet(StreamKind::Video, Vec::new())
}

pub fn audio(pairs: &[(f64, f64)]) -> Step {
    let payload = pairs
        .iter()
        .flat_map(|&(l, r)| SamplePair::new(l, r).to_le_bytes())
        .collect();
    Step::Packet(StreamKind::Audio, payload)
}

pub type CloseLog = Arc<Mutex<Vec<&'static str>>>;

pub struct ScriptedSource {
    steps: VecDeque<Step>,
    frame_rate: Option<f64>,
    open: bool,
    log: CloseLog,
    fail_audio_open: bool,
    decoder_delay: usize,
    audio_tail: Option<Vec<u8>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            frame_rate: Some(30.0),
            open: false,
            log: Arc::new(Mutex::new(Vec::new())),
            fail_audio_open: false,
            decoder_delay: 0,
            audio_tail: None,
        }
    }

    /// 视频解码器先滞留 `frames` 帧，到末尾刷新时才交出
    pub fn with_decoder_delay(mut self, frames: usize) -> Self {
        self.decoder_delay = frames;
        self
    }

    /// 音频刷新时交出的尾部采样
    pub fn with_audio_tail(mut self, pairs: &[(f64, f64)]) -> Self {
        if let Step::Packet(_, payload) = audio(pairs) {
            self.audio_tail = Some(payload);
        }
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: Option<f64>) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn failing_audio_open(mut self) -> Self {
        self.fail_audio_open = true;
        self
    }

    pub fn close_log(&self) -> CloseLog {
        self.log.clone()
    }
}

impl MediaSource for ScriptedSource {
    type Packet = Vec<u8>;
    type Video = ScriptedVideo;
    type Audio = ScriptedAudio;

    fn open_decode(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close_decode(&mut self) {
        self.open = false;
        self.log.lock().push("decode");
    }

    fn take_streams(&mut self) -> Result<(ScriptedVideo, ScriptedAudio)> {
        Ok((
            ScriptedVideo {
                frame_rate: self.frame_rate,
                log: self.log.clone(),
                delay: self.decoder_delay,
                held: VecDeque::new(),
            },
            ScriptedAudio {
                log: self.log.clone(),
                fail_open: self.fail_audio_open,
                tail: self.audio_tail.take(),
            },
        ))
    }

    fn read_packet(&mut self) -> Result<Option<MediaPacket<Vec<u8>>>> {
        if !self.open {
            return Ok(None);
        }
        match self.steps.pop_front() {
            Some(Step::Packet(kind, data)) => Ok(Some(MediaPacket {
                kind,
                stream_index: match kind {
                    StreamKind::Video => 0,
                    StreamKind::Audio => 1,
                },
                data,
            })),
            Some(Step::ReadError) => Err(PlayerError::Other("读取失败".to_string())),
            None => Ok(None),
        }
    }

    fn description(&self) -> String {
        "Scripted Source".to_string()
    }
}

pub struct ScriptedVideo {
    frame_rate: Option<f64>,
    log: CloseLog,
    delay: usize,
    held: VecDeque<VideoFrame>,
}

impl VideoStream for ScriptedVideo {
    type Packet = Vec<u8>;

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().push("video");
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn dimensions(&self) -> (u32, u32) {
        (1, 1)
    }

    fn read_video_frame(&mut self, packet: &Vec<u8>) -> Result<Option<VideoFrame>> {
        match packet.first() {
            None => return Ok(None),
            Some(&CORRUPT) => return Err(PlayerError::DecodeError("损坏的视频包".to_string())),
            Some(&tag) => self.held.push_back(VideoFrame::rgba(1, 1, vec![tag; 4])),
        }
        if self.held.len() > self.delay {
            Ok(self.held.pop_front())
        } else {
            Ok(None)
        }
    }

    fn drain(&mut self) -> Result<Vec<VideoFrame>> {
        Ok(self.held.drain(..).collect())
    }
}

pub struct ScriptedAudio {
    log: CloseLog,
    fail_open: bool,
    tail: Option<Vec<u8>>,
}

impl AudioStream for ScriptedAudio {
    type Packet = Vec<u8>;

    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(PlayerError::StreamOpenError("音频流不可用".to_string()));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().push("audio");
    }

    fn sample_rate(&self) -> u32 {
        48000
    }

    fn read_audio_frame(&mut self, packet: &Vec<u8>) -> Result<Option<Vec<u8>>> {
        if packet.is_empty() {
            Ok(None)
        } else {
            Ok(Some(packet.clone()))
        }
    }

    fn drain(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.tail.take())
    }
}
