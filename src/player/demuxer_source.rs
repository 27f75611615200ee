use crate::core::{MediaInfo, MediaPacket, Result, VideoFrame};

/// 媒体源抽象接口
///
/// 一个媒体源对应一次解码会话：`open_decode` 之后可以取出首个视频流和首个音频流，
/// 然后循环 `read_packet`，结束时依次关闭流和会话。
pub trait MediaSource: Send {
    /// 媒体包负载（FFmpeg 实现中为 `ffmpeg::Packet`）
    type Packet: Send;
    type Video: VideoStream<Packet = Self::Packet>;
    type Audio: AudioStream<Packet = Self::Packet>;

    /// 打开解码会话
    fn open_decode(&mut self) -> Result<()>;

    /// 关闭解码会话，之后 `read_packet` 只会返回 `Ok(None)`
    fn close_decode(&mut self);

    /// 取出首个视频流和首个音频流（尚未打开）
    fn take_streams(&mut self) -> Result<(Self::Video, Self::Audio)>;

    /// 读取下一个媒体包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达末尾
    /// - Err(e): 本次读取失败（可继续读取）
    fn read_packet(&mut self) -> Result<Option<MediaPacket<Self::Packet>>>;

    /// 获取描述信息（用于日志）
    fn description(&self) -> String;
}

/// 视频流
pub trait VideoStream: Send {
    type Packet;

    fn open(&mut self) -> Result<()>;

    fn close(&mut self);

    /// 源报告的帧率，未知时为 None
    fn frame_rate(&self) -> Option<f64>;

    /// 打开后的画面尺寸
    fn dimensions(&self) -> (u32, u32);

    /// 解码一个包，最多产出一帧
    fn read_video_frame(&mut self, packet: &Self::Packet) -> Result<Option<VideoFrame>>;

    /// 到达末尾后取出解码器中滞留的全部帧
    fn drain(&mut self) -> Result<Vec<VideoFrame>>;
}

/// 音频流
pub trait AudioStream: Send {
    type Packet;

    fn open(&mut self) -> Result<()>;

    fn close(&mut self);

    /// 输出采样率
    fn sample_rate(&self) -> u32;

    /// 调整输出采样率（音频设备回退到其他配置时使用）
    fn set_output_rate(&mut self, _sample_rate: u32) {}

    /// 解码一个包，产出小端 f64 交错立体声负载
    fn read_audio_frame(&mut self, packet: &Self::Packet) -> Result<Option<Vec<u8>>>;

    /// 到达末尾后取出解码器和重采样器中滞留的采样
    fn drain(&mut self) -> Result<Option<Vec<u8>>>;
}

/// 已打开的媒体（会话和两个流均已打开）
///
/// 构造失败属于启动期致命错误，此时已打开的部分会被关闭。
pub struct PreparedMedia<S: MediaSource> {
    pub(crate) source: S,
    pub(crate) video: S::Video,
    pub(crate) audio: S::Audio,
}

impl<S: MediaSource> PreparedMedia<S> {
    pub fn open(mut source: S) -> Result<Self> {
        source.open_decode()?;

        let (mut video, mut audio) = match source.take_streams() {
            Ok(streams) => streams,
            Err(e) => {
                source.close_decode();
                return Err(e);
            }
        };

        if let Err(e) = video.open() {
            source.close_decode();
            return Err(e);
        }
        if let Err(e) = audio.open() {
            video.close();
            source.close_decode();
            return Err(e);
        }

        Ok(Self { source, video, audio })
    }

    pub fn media_info(&self) -> MediaInfo {
        let (width, height) = self.video.dimensions();
        MediaInfo {
            width,
            height,
            fps: self.video.frame_rate(),
            sample_rate: self.audio.sample_rate(),
            description: self.source.description(),
        }
    }

    pub fn set_output_rate(&mut self, sample_rate: u32) {
        self.audio.set_output_rate(sample_rate);
    }

    /// 放弃播放，按顺序关闭流和会话
    pub fn close(mut self) {
        self.video.close();
        self.audio.close();
        self.source.close_decode();
    }
}
