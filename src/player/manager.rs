use crate::core::{bounded_queue, ErrorEvent, MediaInfo, PipelineConfig, PlaybackState, PlayerError, Result};
use crate::player::audio_pull::AudioPullAdapter;
use crate::player::demuxer_source::{MediaSource, PreparedMedia};
use crate::player::demuxer_thread::{decode_session, DemuxReport, PacketDemuxer, SessionCloser};
use crate::player::error_sink::error_channel;
use crate::player::frame_pacer::{pacing_period, DisplayBuffer, FramePacer};
use log::{error, info, warn};
use std::process;
use std::thread::{self, JoinHandle};

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

/// 启动后的流水线：控制器 + 两个消费端
pub struct PlaybackPipeline {
    pub controller: PlaybackController,
    /// 交给音频后端
    pub audio: AudioPullAdapter,
    /// 交给 `PlaybackController::run_pacer` 或调用方自己驱动
    pub pacer: FramePacer,
}

/// 播放控制器 - 持有暂停标志并负责启动/停止顺序
pub struct PlaybackController {
    state: PlaybackState,
    session: SessionCloser,
    demux_thread: Option<JoinHandle<DemuxReport>>,
    pacer_thread: Option<JoinHandle<()>>,
    media_info: MediaInfo,
}

impl PlaybackController {
    /// 用已打开的媒体搭建流水线并启动解封装线程
    pub fn start<S: MediaSource + 'static>(
        media: PreparedMedia<S>,
        config: &PipelineConfig,
        display: DisplayBuffer,
    ) -> Result<PlaybackPipeline> {
        if let Err(e) = config.validate() {
            media.close();
            return Err(e);
        }

        let media_info = media.media_info();
        info!("{} 🎮 启动播放流水线: {:?}", log_ctx(), media_info);

        let state = PlaybackState::new(!config.autoplay);
        let (frame_tx, frame_rx) = bounded_queue(config.video_queue_capacity);
        let (sample_tx, sample_rx) = bounded_queue(config.audio_queue_capacity);
        let (error_sink, error_rx) = error_channel(config.error_queue_capacity);
        let (session, signal) = decode_session();

        let demuxer = PacketDemuxer::new(
            media,
            frame_tx,
            sample_tx,
            error_sink,
            signal,
            config.error_policy.clone(),
        );

        let demux_thread = demuxer
            .spawn()
            .map_err(|e| PlayerError::Other(format!("无法启动解封装线程: {}", e)))?;

        let period = pacing_period(media_info.fps, config.fallback_frame_rate);
        let pacer = FramePacer::new(frame_rx, error_rx, state.clone(), display, period);
        let audio = AudioPullAdapter::new(sample_rx, state.clone(), config.pause_poll_interval());

        let controller = Self {
            state,
            session,
            demux_thread: Some(demux_thread),
            pacer_thread: None,
            media_info,
        };

        Ok(PlaybackPipeline {
            controller,
            audio,
            pacer,
        })
    }

    /// 在独立线程中运行帧节拍器，stop() 时一并回收
    pub fn run_pacer<N, E>(&mut self, pacer: FramePacer, notify: N, on_error: E) -> Result<()>
    where
        N: Fn() + Send + 'static,
        E: FnMut(ErrorEvent) + Send + 'static,
    {
        if self.pacer_thread.is_some() {
            return Err(PlayerError::Other("帧节拍器已在运行".to_string()));
        }
        let handle = thread::Builder::new()
            .name("frame-pacer".to_string())
            .spawn(move || pacer.run(notify, on_error))
            .map_err(|e| PlayerError::Other(format!("无法启动帧节拍线程: {}", e)))?;
        self.pacer_thread = Some(handle);
        Ok(())
    }

    /// 播放
    pub fn play(&self) {
        if self.state.is_stopped() {
            warn!("{} ⚠️  已停止，忽略播放请求", log_ctx());
            return;
        }
        info!("{} 🎬 播放", log_ctx());
        self.state.set_paused(false);
    }

    /// 暂停（冻结音频消费和帧推进）
    pub fn pause(&self) {
        if self.state.is_stopped() {
            warn!("{} ⚠️  已停止，忽略暂停请求", log_ctx());
            return;
        }
        info!("{} 🎬 暂停", log_ctx());
        self.state.set_paused(true);
    }

    /// 切换播放/暂停，返回切换后是否暂停
    pub fn toggle(&self) -> bool {
        if self.is_paused() {
            self.play();
        } else {
            self.pause();
        }
        self.is_paused()
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    /// 解封装循环是否已退出（到达末尾或被停止）
    pub fn is_finished(&self) -> bool {
        self.demux_thread
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    /// 停止播放（不可逆，可重复调用）
    ///
    /// 关闭解码会话让解封装循环退出，资源由解封装线程按顺序关闭。
    /// 返回解封装报告（仅首次调用时有值）。
    pub fn stop(&mut self) -> Option<DemuxReport> {
        if self.state.mark_stopped() {
            info!("{} ⏹️  停止播放", log_ctx());
        }
        self.session.close();

        let report = self.demux_thread.take().and_then(|handle| match handle.join() {
            Ok(report) => {
                info!("{} ✅ 解封装线程已结束: {:?}", log_ctx(), report.exit);
                Some(report)
            }
            Err(_) => {
                error!("{} ❌ 解封装线程异常退出", log_ctx());
                None
            }
        });

        if let Some(handle) = self.pacer_thread.take() {
            if handle.join().is_err() {
                error!("{} ❌ 帧节拍线程异常退出", log_ctx());
            } else {
                info!("{} ✅ 帧节拍线程已结束", log_ctx());
            }
        }

        report
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if self.demux_thread.is_some() || self.pacer_thread.is_some() {
            warn!("{} ⚠ PlaybackController 被 drop，但可能未调用 stop()，正在尝试优雅停止", log_ctx());
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SamplePair;
    use crate::player::demuxer_thread::DemuxExit;
    use crate::player::test_source::{self, ScriptedSource};
    use std::time::{Duration, Instant};

    fn config() -> PipelineConfig {
        PipelineConfig {
            video_queue_capacity: 2,
            audio_queue_capacity: 2,
            ..PipelineConfig::default()
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_fatal_startup_error_closes_opened_parts() {
        let source = ScriptedSource::new(vec![]).failing_audio_open();
        let log = source.close_log();

        let err = PreparedMedia::open(source).err().unwrap();
        assert!(matches!(err, PlayerError::StreamOpenError(_)));
        assert_eq!(*log.lock(), vec!["video", "decode"]);
    }

    #[test]
    fn test_invalid_config_closes_opened_media() {
        let source = ScriptedSource::new(vec![test_source::video(1)]);
        let log = source.close_log();
        let media = PreparedMedia::open(source).unwrap();
        let cfg = PipelineConfig {
            video_queue_capacity: 0,
            ..config()
        };

        let err = PlaybackController::start(media, &cfg, DisplayBuffer::new()).err().unwrap();
        assert!(matches!(err, PlayerError::ConfigError(_)));
        assert_eq!(*log.lock(), vec!["video", "audio", "decode"]);
    }

    #[test]
    fn test_zero_frame_rate_source_paces_at_60fps() {
        let source = ScriptedSource::new(vec![]).with_frame_rate(Some(0.0));
        let media = PreparedMedia::open(source).unwrap();
        let mut pipeline = PlaybackController::start(media, &config(), DisplayBuffer::new()).unwrap();

        assert_eq!(pipeline.pacer.period(), Duration::from_secs_f64(1.0 / 60.0));
        pipeline.controller.stop();
    }

    #[test]
    fn test_play_pause_toggle() {
        let media = PreparedMedia::open(ScriptedSource::new(vec![])).unwrap();
        let cfg = PipelineConfig {
            autoplay: false,
            ..config()
        };
        let mut pipeline = PlaybackController::start(media, &cfg, DisplayBuffer::new()).unwrap();
        let controller = &mut pipeline.controller;

        assert!(controller.is_paused());
        assert!(!controller.toggle());
        controller.pause();
        assert!(controller.is_paused());

        controller.stop();
        // 停止后暂停标志不再生效
        controller.pause();
        assert!(!controller.is_paused());
        assert!(controller.is_stopped());
    }

    #[test]
    fn test_stop_after_end_of_stream_is_idempotent() {
        let steps = vec![test_source::video(1), test_source::audio(&[(0.5, 0.5)])];
        let media = PreparedMedia::open(ScriptedSource::new(steps)).unwrap();
        let display = DisplayBuffer::new();
        let pipeline = PlaybackController::start(media, &config(), display.clone()).unwrap();
        let PlaybackPipeline {
            mut controller,
            mut audio,
            pacer,
        } = pipeline;

        let mut buf = [SamplePair::SILENCE; 4];
        let result = audio.pull(&mut buf);
        assert_eq!((result.filled, result.more), (1, false));

        controller.run_pacer(pacer, || {}, |_| {}).unwrap();
        assert!(wait_until(|| controller.is_finished()));
        assert!(wait_until(|| display.generation() == 1));

        let report = controller.stop().unwrap();
        assert!(report.reached_end());
        assert_eq!(report.stats.frames, 1);
        assert!(controller.stop().is_none());
    }

    #[test]
    fn test_stop_while_paused_with_full_queues() {
        let steps = (0..20).map(test_source::video).collect();
        let media = PreparedMedia::open(ScriptedSource::new(steps)).unwrap();
        let pipeline = PlaybackController::start(media, &config(), DisplayBuffer::new()).unwrap();
        let PlaybackPipeline {
            mut controller,
            mut audio,
            pacer,
        } = pipeline;

        controller.pause();
        controller.run_pacer(pacer, || {}, |_| {}).unwrap();
        let audio_thread = thread::spawn(move || audio.pull(&mut [SamplePair::SILENCE; 8]));

        thread::sleep(Duration::from_millis(50));
        assert!(!controller.is_finished());

        let report = controller.stop().unwrap();
        assert_eq!(report.exit, DemuxExit::Stopped);
        assert!(!audio_thread.join().unwrap().more);
    }
}
