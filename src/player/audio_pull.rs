use crate::core::{PlaybackState, Popped, QueueConsumer, SamplePair};
use std::thread;
use std::time::Duration;

/// 一次拉取的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullResult {
    /// 已填充的立体声帧数
    pub filled: usize,
    /// false 表示采样队列已关闭且取空，不会再有数据
    pub more: bool,
}

/// 音频拉取适配器 - 由音频后端在自己的线程中按需调用
///
/// 暂停时冻结消费：停在当前槽位轮询等待，不会从队列取出采样。
/// `pull` 需要 `&mut self`，因此同一时刻只有一个调用方。
pub struct AudioPullAdapter {
    samples: QueueConsumer<SamplePair>,
    state: PlaybackState,
    poll_interval: Duration,
}

impl AudioPullAdapter {
    pub fn new(
        samples: QueueConsumer<SamplePair>,
        state: PlaybackState,
        poll_interval: Duration,
    ) -> Self {
        Self {
            samples,
            state,
            poll_interval,
        }
    }

    /// 填充 `dst`，返回已填充的数量和是否还有后续数据
    pub fn pull(&mut self, dst: &mut [SamplePair]) -> PullResult {
        let mut filled = 0;

        while filled < dst.len() {
            if self.state.is_paused() {
                thread::sleep(self.poll_interval);
                continue;
            }

            match self.samples.pop() {
                Popped::Value(pair) => {
                    dst[filled] = pair;
                    filled += 1;
                }
                Popped::Closed => return PullResult { filled, more: false },
            }
        }

        PullResult { filled, more: true }
    }

    /// 队列中待消费的采样数
    pub fn buffered(&self) -> usize {
        self.samples.len()
    }
}
