use crate::core::{
    sample_pairs, ErrorEvent, ErrorPolicy, ErrorStage, MediaPacket, PlayerError, PushError,
    QueueProducer, SamplePair, StreamKind, VideoFrame,
};
use crate::player::demuxer_source::{AudioStream, MediaSource, PreparedMedia, VideoStream};
use crate::player::error_sink::ErrorSink;
use crossbeam_channel::{bounded, unbounded, Receiver, SendError, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 高频日志只记录前几条，之后每 100 条记录一次
fn log_sampled(count: usize) -> bool {
    const LOG_FIRST_N: usize = 5;
    count <= LOG_FIRST_N || count % 100 == 0
}

fn push_exit(error: PushError) -> DemuxExit {
    match error {
        PushError::Cancelled => DemuxExit::Stopped,
        PushError::Disconnected => {
            warn!("{} ❌ 队列消费端已关闭，停止解封装", log_ctx());
            DemuxExit::ConsumerGone
        }
    }
}

/// 创建解码会话开关
///
/// 关闭会话后，解封装循环在下一次读包前退出；阻塞在满队列上的入队也会被释放。
pub fn decode_session() -> (SessionCloser, SessionSignal) {
    let closed = Arc::new(AtomicBool::new(false));
    let (tx, rx) = unbounded();
    (
        SessionCloser {
            closed: closed.clone(),
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        SessionSignal { closed, rx },
    )
}

/// 会话关闭端（由控制器持有，可重复调用）
#[derive(Clone)]
pub struct SessionCloser {
    closed: Arc<AtomicBool>,
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

impl SessionCloser {
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // drop 发送端，让等待方的 recv() 立即返回
        self.tx.lock().take();
    }
}

/// 会话状态观察端（由解封装线程持有）
pub struct SessionSignal {
    closed: Arc<AtomicBool>,
    rx: Receiver<()>,
}

impl SessionSignal {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// 解封装循环退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxExit {
    /// 到达末尾（唯一的正常结束信号）
    EndOfStream,
    /// 会话被关闭
    Stopped,
    /// 消费端已不存在
    ConsumerGone,
    /// 连续错误达到上限
    TooManyErrors,
}

/// 解封装统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub packets: usize,
    pub video_packets: usize,
    pub audio_packets: usize,
    pub frames: usize,
    pub sample_pairs: usize,
    pub errors: usize,
}

#[derive(Debug)]
pub struct DemuxReport {
    pub exit: DemuxExit,
    pub stats: DemuxStats,
}

impl DemuxReport {
    pub fn reached_end(&self) -> bool {
        self.exit == DemuxExit::EndOfStream
    }
}

enum DispatchError {
    Decode(ErrorStage, PlayerError),
    Push(PushError),
}

/// 解封装器 - 单线程循环读取媒体包并按流类型分发到解码器和队列
pub struct PacketDemuxer<S: MediaSource> {
    source: S,
    video: S::Video,
    audio: S::Audio,
    frames: QueueProducer<VideoFrame>,
    samples: QueueProducer<SamplePair>,
    errors: ErrorSink,
    session: SessionSignal,
    policy: ErrorPolicy,
    stats: DemuxStats,
    consecutive_errors: u32,
}

impl<S: MediaSource + 'static> PacketDemuxer<S> {
    pub fn new(
        media: PreparedMedia<S>,
        frames: QueueProducer<VideoFrame>,
        samples: QueueProducer<SamplePair>,
        errors: ErrorSink,
        session: SessionSignal,
        policy: ErrorPolicy,
    ) -> Self {
        let PreparedMedia {
            source,
            video,
            audio,
        } = media;
        Self {
            source,
            video,
            audio,
            frames,
            samples,
            errors,
            session,
            policy,
            stats: DemuxStats::default(),
            consecutive_errors: 0,
        }
    }

    /// 在独立线程中运行
    ///
    /// 线程创建成功后才把解封装器交给它；创建失败时在当前线程按顺序关闭资源。
    pub fn spawn(self) -> std::io::Result<JoinHandle<DemuxReport>> {
        let (handoff_tx, handoff_rx) = bounded::<Self>(1);
        let spawned = thread::Builder::new()
            .name("demuxer".to_string())
            .spawn(move || match handoff_rx.recv() {
                Ok(demuxer) => demuxer.run(),
                Err(_) => DemuxReport {
                    exit: DemuxExit::Stopped,
                    stats: DemuxStats::default(),
                },
            });

        match spawned {
            Ok(handle) => {
                if let Err(SendError(demuxer)) = handoff_tx.send(self) {
                    demuxer.shutdown();
                }
                Ok(handle)
            }
            Err(e) => {
                warn!("{} ❌ 无法创建解封装线程: {}", log_ctx(), e);
                self.shutdown();
                Err(e)
            }
        }
    }

    /// 运行循环直到退出，然后按顺序关闭所有资源
    pub fn run(mut self) -> DemuxReport {
        info!("{} 🎬 Demuxer 线程启动: {}", log_ctx(), self.source.description());

        let mut exit = self.demux_loop();
        if exit == DemuxExit::EndOfStream {
            exit = self.drain_decoders();
        }
        let stats = self.stats;

        info!(
            "{} 🛑 Demuxer 循环退出 ({:?})：共读取 {} 个包（{} 视频，{} 音频），{} 帧，{} 采样对，{} 个错误",
            log_ctx(),
            exit,
            stats.packets,
            stats.video_packets,
            stats.audio_packets,
            stats.frames,
            stats.sample_pairs,
            stats.errors
        );

        debug!(
            "{} 队列占用：视频 {}/{}，音频 {}/{}，丢弃错误 {} 个",
            log_ctx(),
            self.frames.len(),
            self.frames.capacity(),
            self.samples.len(),
            self.samples.capacity(),
            self.errors.dropped()
        );

        self.shutdown();
        DemuxReport { exit, stats }
    }

    fn demux_loop(&mut self) -> DemuxExit {
        loop {
            if self.session.is_closed() {
                return DemuxExit::Stopped;
            }

            let packet = match self.source.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    if self.session.is_closed() {
                        return DemuxExit::Stopped;
                    }
                    info!("{} 📄 Demuxer 到达末尾", log_ctx());
                    return DemuxExit::EndOfStream;
                }
                Err(e) => {
                    if self.report(ErrorStage::Read, e) {
                        return DemuxExit::TooManyErrors;
                    }
                    continue;
                }
            };

            self.stats.packets += 1;
            let count = match packet.kind {
                StreamKind::Video => {
                    self.stats.video_packets += 1;
                    self.stats.video_packets
                }
                StreamKind::Audio => {
                    self.stats.audio_packets += 1;
                    self.stats.audio_packets
                }
            };
            if log_sampled(count) {
                debug!(
                    "{} 📦 Demuxer 读取{:?}包 #{}（stream {}, total packets {}）",
                    log_ctx(),
                    packet.kind,
                    count,
                    packet.stream_index,
                    self.stats.packets
                );
            }

            match self.dispatch(packet) {
                Ok(()) => self.consecutive_errors = 0,
                Err(DispatchError::Decode(stage, e)) => {
                    if self.report(stage, e) {
                        return DemuxExit::TooManyErrors;
                    }
                }
                Err(DispatchError::Push(e)) => return push_exit(e),
            }
        }
    }

    /// 到达末尾后刷新两个解码器，把滞留的帧和采样送入队列
    fn drain_decoders(&mut self) -> DemuxExit {
        for kind in [StreamKind::Video, StreamKind::Audio] {
            match self.drain_stream(kind) {
                Ok(()) => {}
                // 循环已经结束，错误只上报不再计入终止策略
                Err(DispatchError::Decode(stage, e)) => {
                    self.report(stage, e);
                }
                Err(DispatchError::Push(e)) => return push_exit(e),
            }
        }
        DemuxExit::EndOfStream
    }

    fn drain_stream(&mut self, kind: StreamKind) -> Result<(), DispatchError> {
        match kind {
            StreamKind::Video => {
                let frames = self
                    .video
                    .drain()
                    .map_err(|e| DispatchError::Decode(ErrorStage::VideoDecode, e))?;
                if !frames.is_empty() {
                    debug!("{} 🎞️  解码器刷新出 {} 帧", log_ctx(), frames.len());
                }
                for frame in frames {
                    self.push_frame(frame)?;
                }
            }
            StreamKind::Audio => {
                let payload = self
                    .audio
                    .drain()
                    .map_err(|e| DispatchError::Decode(ErrorStage::AudioDecode, e))?;
                if let Some(payload) = payload {
                    self.push_payload(&payload)?;
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, packet: MediaPacket<S::Packet>) -> Result<(), DispatchError> {
        match packet.kind {
            StreamKind::Video => {
                let frame = self
                    .video
                    .read_video_frame(&packet.data)
                    .map_err(|e| DispatchError::Decode(ErrorStage::VideoDecode, e))?;
                if let Some(frame) = frame {
                    self.push_frame(frame)?;
                }
            }
            StreamKind::Audio => {
                let payload = self
                    .audio
                    .read_audio_frame(&packet.data)
                    .map_err(|e| DispatchError::Decode(ErrorStage::AudioDecode, e))?;
                if let Some(payload) = payload {
                    self.push_payload(&payload)?;
                }
            }
        }
        Ok(())
    }

    /// 队列满时阻塞，起到背压；会话关闭时放弃
    fn push_frame(&mut self, frame: VideoFrame) -> Result<(), DispatchError> {
        self.frames
            .push_until(frame, self.session.receiver())
            .map_err(DispatchError::Push)?;
        self.stats.frames += 1;
        Ok(())
    }

    fn push_payload(&mut self, payload: &[u8]) -> Result<(), DispatchError> {
        let pairs = sample_pairs(payload)
            .map_err(|e| DispatchError::Decode(ErrorStage::AudioDecode, e))?;
        for pair in pairs {
            self.samples
                .push_until(pair, self.session.receiver())
                .map_err(DispatchError::Push)?;
            self.stats.sample_pairs += 1;
        }
        Ok(())
    }

    /// 上报错误，返回是否应当终止循环
    fn report(&mut self, stage: ErrorStage, error: PlayerError) -> bool {
        self.stats.errors += 1;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        if log_sampled(self.stats.errors) {
            warn!(
                "{} ❌ {}失败 (#{}): {}",
                log_ctx(),
                stage.as_str(),
                self.stats.errors,
                error
            );
        }
        self.errors.report(ErrorEvent::new(stage, error));

        if self.policy.should_terminate(self.consecutive_errors) {
            warn!(
                "{} ⛔ 连续 {} 次失败，终止解封装",
                log_ctx(),
                self.consecutive_errors
            );
            return true;
        }
        false
    }

    /// 关闭顺序：视频流、音频流、解码会话、帧队列、采样队列、错误通道
    fn shutdown(self) {
        let Self {
            mut source,
            mut video,
            mut audio,
            frames,
            samples,
            errors,
            ..
        } = self;

        video.close();
        audio.close();
        source.close_decode();
        frames.close();
        samples.close();
        errors.close();
        info!("{} ✅ Demuxer 资源已全部关闭", log_ctx());
    }
}
