use crate::core::{MediaPacket, PlayerError, Result, StreamKind};
use crate::player::decoder::{FfmpegAudioStream, FfmpegVideoStream};
use crate::player::demuxer_source::MediaSource;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};

/// FFmpeg 媒体源 - 负责打开媒体文件并分离音视频包
pub struct FfmpegSource {
    path: String,
    input_ctx: Option<format::context::Input>,
    video_stream_index: Option<usize>,
    audio_stream_index: Option<usize>,
}

impl FfmpegSource {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            input_ctx: None,
            video_stream_index: None,
            audio_stream_index: None,
        }
    }

    /// 查找某类型的第一个流
    fn first_stream(input_ctx: &format::context::Input, kind: media::Type) -> Option<usize> {
        input_ctx
            .streams()
            .find(|s| s.parameters().medium() == kind)
            .map(|s| s.index())
    }

    fn kind_of(&self, stream_index: usize) -> Option<StreamKind> {
        if Some(stream_index) == self.video_stream_index {
            Some(StreamKind::Video)
        } else if Some(stream_index) == self.audio_stream_index {
            Some(StreamKind::Audio)
        } else {
            None
        }
    }
}

impl MediaSource for FfmpegSource {
    type Packet = ffmpeg::Packet;
    type Video = FfmpegVideoStream;
    type Audio = FfmpegAudioStream;

    fn open_decode(&mut self) -> Result<()> {
        info!("正在打开文件: {}", self.path);

        let input_ctx = format::input(&self.path)
            .map_err(|e| PlayerError::OpenError(format!("无法打开文件: {}", e)))?;

        self.video_stream_index = Self::first_stream(&input_ctx, media::Type::Video);
        self.audio_stream_index = Self::first_stream(&input_ctx, media::Type::Audio);

        debug!("视频流索引: {:?}", self.video_stream_index);
        debug!("音频流索引: {:?}", self.audio_stream_index);

        self.input_ctx = Some(input_ctx);
        Ok(())
    }

    fn close_decode(&mut self) {
        if self.input_ctx.take().is_some() {
            info!("解码会话已关闭: {}", self.path);
        }
    }

    fn take_streams(&mut self) -> Result<(FfmpegVideoStream, FfmpegAudioStream)> {
        let input_ctx = self
            .input_ctx
            .as_ref()
            .ok_or_else(|| PlayerError::Other("解码会话未打开".to_string()))?;

        let video_stream = self
            .video_stream_index
            .and_then(|idx| input_ctx.stream(idx))
            .ok_or(PlayerError::NoVideoStream)?;
        let audio_stream = self
            .audio_stream_index
            .and_then(|idx| input_ctx.stream(idx))
            .ok_or(PlayerError::NoAudioStream)?;

        Ok((
            FfmpegVideoStream::new(&video_stream),
            FfmpegAudioStream::new(&audio_stream),
        ))
    }

    fn read_packet(&mut self) -> Result<Option<MediaPacket<ffmpeg::Packet>>> {
        loop {
            let Some(input_ctx) = self.input_ctx.as_mut() else {
                return Ok(None);
            };

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(input_ctx) {
                Ok(()) => {
                    let stream_index = packet.stream();
                    if let Some(kind) = self.kind_of(stream_index) {
                        return Ok(Some(MediaPacket {
                            kind,
                            stream_index,
                            data: packet,
                        }));
                    }
                    // 否则跳过这个包，继续循环
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn description(&self) -> String {
        format!("FFmpeg Source: {}", self.path)
    }
}
