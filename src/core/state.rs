use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 共享播放状态
///
/// `paused` 只用于节拍控制的尽力而为门控，读者可以看到最多一个节拍周期的旧值。
/// 进入 stopped 后暂停标志不再生效，保证消费者能退出等待。
#[derive(Clone, Debug)]
pub struct PlaybackState {
    inner: Arc<StateInner>,
}

#[derive(Debug)]
struct StateInner {
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl PlaybackState {
    pub fn new(paused: bool) -> Self {
        Self {
            inner: Arc::new(StateInner {
                paused: AtomicBool::new(paused),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// 是否应当冻结消费（暂停且未停止）
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Relaxed) && !self.is_stopped()
    }

    pub fn set_paused(&self, paused: bool) {
        self.inner.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// 标记停止（不可逆），返回是否为首次停止
    pub fn mark_stopped(&self) -> bool {
        !self.inner.stopped.swap(true, Ordering::AcqRel)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_overrides_pause() {
        let state = PlaybackState::new(true);
        let reader = state.clone();
        assert!(reader.is_paused());

        assert!(state.mark_stopped());
        assert!(!state.mark_stopped());
        assert!(!reader.is_paused());
        assert!(reader.is_stopped());
    }
}
