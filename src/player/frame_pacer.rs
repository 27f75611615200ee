use crate::core::{ErrorEvent, PlaybackState, QueueConsumer, TryPopped, VideoFrame};
use crate::player::error_sink::ErrorReceiver;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// 根据源帧率计算节拍周期；帧率为 0、非法或未知时使用回退帧率
pub fn pacing_period(frame_rate: Option<f64>, fallback_frame_rate: f64) -> Duration {
    let fps = match frame_rate {
        Some(fps) if fps.is_finite() && fps > 0.0 => fps,
        _ => fallback_frame_rate,
    };
    Duration::from_secs_f64(1.0 / fps)
}

/// 显示缓冲区内容
#[derive(Debug, Default)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,      // RGBA
    /// 每次写入新帧递增，渲染端据此判断是否需要更新纹理
    pub generation: u64,
}

/// 共享显示缓冲区（节拍器写，UI 读）
#[derive(Clone, Default)]
pub struct DisplayBuffer {
    inner: Arc<Mutex<PixelBuffer>>,
}

impl DisplayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 复制一帧到显示缓冲区
    pub fn present(&self, frame: &VideoFrame) {
        let mut buf = self.inner.lock();
        buf.width = frame.width;
        buf.height = frame.height;
        buf.data.clear();
        buf.data.extend_from_slice(&frame.data);
        buf.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// 在锁内访问当前内容
    pub fn with<R>(&self, f: impl FnOnce(&PixelBuffer) -> R) -> R {
        f(&self.inner.lock())
    }
}

/// 单个节拍的结果
#[derive(Debug, Default)]
pub struct TickReport {
    pub error: Option<ErrorEvent>,
    /// 本节拍写入了新帧，需要重绘
    pub presented: bool,
    /// 帧队列已关闭且取空
    pub frames_drained: bool,
}

/// 帧节拍器 - 固定周期从帧队列取帧写入显示缓冲区
pub struct FramePacer {
    frames: QueueConsumer<VideoFrame>,
    errors: ErrorReceiver,
    state: PlaybackState,
    display: DisplayBuffer,
    period: Duration,
}

impl FramePacer {
    pub fn new(
        frames: QueueConsumer<VideoFrame>,
        errors: ErrorReceiver,
        state: PlaybackState,
        display: DisplayBuffer,
        period: Duration,
    ) -> Self {
        Self {
            frames,
            errors,
            state,
            display,
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn display(&self) -> &DisplayBuffer {
        &self.display
    }

    /// 执行一个节拍（从不阻塞）
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport {
            error: self.errors.try_next(),
            ..TickReport::default()
        };

        if self.state.is_paused() {
            return report;
        }

        match self.frames.try_pop() {
            TryPopped::Value(frame) => {
                self.display.present(&frame);
                report.presented = true;
            }
            TryPopped::Empty => {}
            TryPopped::Closed => report.frames_drained = true,
        }
        report
    }

    /// 按固定周期运行，直到停止或数据全部消费完
    ///
    /// `notify` 在每次写入新帧后调用，`on_error` 接收运行期错误（由调用方决定是否展示）。
    pub fn run<N, E>(mut self, notify: N, mut on_error: E)
    where
        N: Fn(),
        E: FnMut(ErrorEvent),
    {
        info!("⏱️  帧节拍器启动，周期 {:?}", self.period);
        let ticker = crossbeam_channel::tick(self.period);
        let mut presented: u64 = 0;

        while ticker.recv().is_ok() {
            if self.state.is_stopped() {
                break;
            }

            let report = self.tick();
            if let Some(event) = report.error {
                on_error(event);
            }
            if report.presented {
                presented += 1;
                notify();
            }
            if report.frames_drained && self.errors.is_drained() {
                debug!("帧队列与错误通道均已关闭");
                break;
            }
        }

        info!(
            "⏹️  帧节拍器退出，共显示 {} 帧，丢弃 {} 帧",
            presented,
            self.frames.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{bounded_queue, ErrorStage, PlayerError, QueueProducer};
    use crate::player::error_sink::{error_channel, ErrorSink};
    use std::time::Instant;

    fn frame(tag: u8) -> VideoFrame {
        VideoFrame::rgba(1, 1, vec![tag; 4])
    }

    fn pacer(paused: bool) -> (FramePacer, QueueProducer<VideoFrame>, ErrorSink, PlaybackState) {
        let (producer, consumer) = bounded_queue(8);
        let (sink, errors) = error_channel(4);
        let state = PlaybackState::new(paused);
        let pacer = FramePacer::new(
            consumer,
            errors,
            state.clone(),
            DisplayBuffer::new(),
            pacing_period(Some(30.0), 60.0),
        );
        (pacer, producer, sink, state)
    }

    #[test]
    fn test_zero_frame_rate_falls_back_to_60fps() {
        let expected = Duration::from_secs_f64(1.0 / 60.0);
        assert_eq!(pacing_period(Some(0.0), 60.0), expected);
        assert_eq!(pacing_period(None, 60.0), expected);
        assert_eq!(pacing_period(Some(f64::NAN), 60.0), expected);
        assert_eq!(pacing_period(Some(25.0), 60.0), Duration::from_millis(40));
    }

    #[test]
    fn test_one_frame_per_step_at_30fps() {
        let (mut pacer, producer, _sink, _state) = pacer(false);
        assert_eq!(pacer.period(), Duration::from_secs_f64(1.0 / 30.0));

        // 模拟时钟：每步 1/30 秒，第 3 步时队列暂时为空
        let schedule = [Some(1u8), Some(2), None, Some(3)];
        let mut generations = Vec::new();
        for item in schedule {
            if let Some(tag) = item {
                producer.push(frame(tag)).unwrap();
            }
            let report = pacer.tick();
            assert_eq!(report.presented, item.is_some());
            generations.push(pacer.display().generation());
        }

        assert_eq!(generations, vec![1, 2, 2, 3]);
        pacer.display().with(|buf| {
            assert_eq!((buf.width, buf.height), (1, 1));
            assert_eq!(buf.data, vec![3; 4]);
        });
    }

    #[test]
    fn test_tick_never_blocks_on_empty_queue() {
        let (mut pacer, _producer, _sink, _state) = pacer(false);
        let start = Instant::now();
        for _ in 0..100 {
            let report = pacer.tick();
            assert!(!report.presented);
            assert!(!report.frames_drained);
        }
        assert!(start.elapsed() < pacer.period());
    }

    #[test]
    fn test_paused_skips_frames_but_reports_errors() {
        let (mut pacer, producer, mut sink, state) = pacer(true);
        producer.push(frame(9)).unwrap();
        sink.report(ErrorEvent::new(
            ErrorStage::VideoDecode,
            PlayerError::DecodeError("bad".to_string()),
        ));

        let report = pacer.tick();
        assert!(!report.presented);
        assert_eq!(report.error.map(|e| e.stage), Some(ErrorStage::VideoDecode));

        state.set_paused(false);
        assert!(pacer.tick().presented);
    }

    #[test]
    fn test_closed_queue_is_not_an_error() {
        let (mut pacer, producer, sink, _state) = pacer(false);
        producer.push(frame(1)).unwrap();
        producer.close();
        sink.close();

        assert!(pacer.tick().presented);
        let report = pacer.tick();
        assert!(report.frames_drained);
        assert!(report.error.is_none());
        assert!(!report.presented);
    }

    #[test]
    fn test_run_exits_after_drain() {
        let (pacer, producer, sink, _state) = pacer(false);
        producer.push(frame(1)).unwrap();
        producer.push(frame(2)).unwrap();
        producer.close();
        sink.close();

        let redraws = std::cell::Cell::new(0);
        pacer.run(|| redraws.set(redraws.get() + 1), |_| {});
        assert_eq!(redraws.get(), 2);
    }
}
