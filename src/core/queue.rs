use crossbeam_channel::{bounded, select, Receiver, RecvError, Sender, TryRecvError};
use thiserror::Error;

/// 阻塞出队结果
#[derive(Debug, PartialEq)]
pub enum Popped<T> {
    Value(T),
    /// 生产端已关闭且队列已空
    Closed,
}

/// 非阻塞出队结果
#[derive(Debug, PartialEq)]
pub enum TryPopped<T> {
    Value(T),
    Empty,
    Closed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    #[error("队列消费端已关闭")]
    Disconnected,
    #[error("入队被取消（解码会话已关闭）")]
    Cancelled,
}

/// 创建容量固定的有界队列
///
/// 满时 push 阻塞生产者（背压）；生产端 close 后，消费端取完剩余数据即得到 Closed。
/// 生产端不可克隆，close 消耗所有权，因此只会关闭一次且关闭后无法再入队。
pub fn bounded_queue<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    assert!(capacity > 0, "队列容量必须大于 0");
    let (tx, rx) = bounded(capacity);
    (
        QueueProducer { tx, capacity },
        QueueConsumer { rx },
    )
}

pub struct QueueProducer<T> {
    tx: Sender<T>,
    capacity: usize,
}

impl<T> QueueProducer<T> {
    /// 入队，队列满时阻塞
    pub fn push(&self, item: T) -> Result<(), PushError> {
        self.tx.send(item).map_err(|_| PushError::Disconnected)
    }

    /// 入队，队列满时阻塞，直到有空位或 `cancel` 通道断开
    pub fn push_until(&self, item: T, cancel: &Receiver<()>) -> Result<(), PushError> {
        select! {
            send(self.tx, item) -> res => res.map_err(|_| PushError::Disconnected),
            recv(cancel) -> _ => Err(PushError::Cancelled),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// 关闭队列（消费端仍可取完剩余数据）
    pub fn close(self) {
        drop(self.tx);
    }
}

pub struct QueueConsumer<T> {
    rx: Receiver<T>,
}

impl<T> QueueConsumer<T> {
    /// 出队，队列空时阻塞，直到有数据或队列关闭
    pub fn pop(&self) -> Popped<T> {
        match self.rx.recv() {
            Ok(item) => Popped::Value(item),
            Err(RecvError) => Popped::Closed,
        }
    }

    /// 非阻塞出队
    pub fn try_pop(&self) -> TryPopped<T> {
        match self.rx.try_recv() {
            Ok(item) => TryPopped::Value(item),
            Err(TryRecvError::Empty) => TryPopped::Empty,
            Err(TryRecvError::Disconnected) => TryPopped::Closed,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_blocks_when_full() {
        for capacity in [1usize, 2, 5] {
            let (producer, consumer) = bounded_queue::<usize>(capacity);
            for i in 0..capacity {
                producer.push(i).unwrap();
            }

            let pushed = Arc::new(AtomicBool::new(false));
            let pushed_flag = pushed.clone();
            let handle = thread::spawn(move || {
                producer.push(capacity).unwrap();
                pushed_flag.store(true, Ordering::SeqCst);
                producer
            });

            thread::sleep(Duration::from_millis(50));
            assert!(!pushed.load(Ordering::SeqCst), "第 C+1 个入队应被阻塞");
            assert_eq!(consumer.len(), capacity);

            assert_eq!(consumer.pop(), Popped::Value(0));
            let producer = handle.join().unwrap();
            assert!(pushed.load(Ordering::SeqCst));
            producer.close();

            // 没有数据被丢弃或覆盖
            let mut rest = Vec::new();
            while let Popped::Value(v) = consumer.pop() {
                rest.push(v);
            }
            assert_eq!(rest, (1..=capacity).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_pop_returns_closed_after_drain() {
        let (producer, consumer) = bounded_queue(4);
        producer.push("a").unwrap();
        producer.close();

        assert_eq!(consumer.try_pop(), TryPopped::Value("a"));
        assert_eq!(consumer.try_pop(), TryPopped::Closed);
        assert_eq!(consumer.pop(), Popped::Closed);
    }

    #[test]
    fn test_try_pop_empty_does_not_block() {
        let (_producer, consumer) = bounded_queue::<u8>(2);
        assert_eq!(consumer.try_pop(), TryPopped::Empty);
    }

    #[test]
    fn test_push_until_cancelled() {
        let (producer, _consumer) = bounded_queue(1);
        let (cancel_tx, cancel_rx) = unbounded::<()>();
        producer.push(1).unwrap();

        let handle = thread::spawn(move || producer.push_until(2, &cancel_rx));
        thread::sleep(Duration::from_millis(20));
        drop(cancel_tx);

        assert_eq!(handle.join().unwrap(), Err(PushError::Cancelled));
    }

    #[test]
    fn test_push_after_consumer_dropped() {
        let (producer, consumer) = bounded_queue(1);
        drop(consumer);
        assert_eq!(producer.push(1), Err(PushError::Disconnected));
    }
}
