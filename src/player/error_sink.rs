use crate::core::ErrorEvent;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use log::warn;

/// 创建错误通道
///
/// 有界通道 + 丢弃最旧策略：上报永不阻塞解封装循环，
/// 没有读者时最多保留 `capacity` 条最新的错误。
pub fn error_channel(capacity: usize) -> (ErrorSink, ErrorReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        ErrorSink {
            tx,
            evict_rx: rx.clone(),
            dropped: 0,
        },
        ErrorReceiver { rx, peeked: None },
    )
}

/// 错误上报端（由解封装线程持有）
pub struct ErrorSink {
    tx: Sender<ErrorEvent>,
    // 用于在通道满时淘汰最旧的错误
    evict_rx: Receiver<ErrorEvent>,
    dropped: u64,
}

impl ErrorSink {
    /// 非阻塞上报一个错误
    pub fn report(&mut self, event: ErrorEvent) {
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    if self.evict_rx.try_recv().is_ok() {
                        self.dropped += 1;
                        if self.dropped == 1 || self.dropped % 100 == 0 {
                            warn!("⚠️  错误通道已满，已丢弃 {} 条旧错误", self.dropped);
                        }
                    }
                    event = returned;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// 被淘汰的错误数量
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 关闭错误通道
    pub fn close(self) {
        drop(self.tx);
    }
}

/// 错误接收端（由节拍器轮询）
pub struct ErrorReceiver {
    rx: Receiver<ErrorEvent>,
    peeked: Option<ErrorEvent>,
}

impl ErrorReceiver {
    /// 非阻塞取出一个错误
    pub fn try_next(&mut self) -> Option<ErrorEvent> {
        self.peeked.take().or_else(|| self.rx.try_recv().ok())
    }

    /// 上报端已关闭且没有剩余错误
    pub fn is_drained(&mut self) -> bool {
        if self.peeked.is_some() {
            return false;
        }
        match self.rx.try_recv() {
            Ok(event) => {
                self.peeked = Some(event);
                false
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => true,
        }
    }
}
