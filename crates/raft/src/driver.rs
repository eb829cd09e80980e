//! 事件循环驱动器
//!
//! 负责单个 Raft 节点的事件调度与定时器服务：所有输入（定时器、RPC、
//! 客户端提案）汇聚到同一个队列，由单个处理循环顺序消费，保证状态机
//! 串行执行且不在持锁状态下做任何 I/O。

use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

use crate::event::Event;
use crate::types::TimerId;

/// 事件通道容量（提供背压保护）
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 定时器事件
#[derive(Debug)]
struct TimerEvent {
    timer_id: TimerId,
    event: Event,
    trigger_time: Instant,
}

impl PartialEq for TimerEvent {
    fn eq(&self, other: &Self) -> bool {
        self.trigger_time.eq(&other.trigger_time)
    }
}

impl Eq for TimerEvent {}

impl PartialOrd for TimerEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // 反转顺序实现最小堆
        other.trigger_time.cmp(&self.trigger_time)
    }
}

/// 事件处理 trait
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event);
}

/// 定时器内部状态
struct TimerInner {
    timer_id_counter: AtomicU64,
    timer_heap: Mutex<BinaryHeap<TimerEvent>>,
    /// 已取消的定时器 ID（惰性删除）
    cancelled_timers: Mutex<HashSet<TimerId>>,
}

/// 定时器服务
#[derive(Clone)]
pub struct Timers {
    inner: Arc<TimerInner>,
    notify: Arc<Notify>,
}

impl Timers {
    fn new(notify: Arc<Notify>) -> Self {
        Self {
            notify,
            inner: Arc::new(TimerInner {
                timer_id_counter: AtomicU64::new(0),
                timer_heap: Mutex::new(BinaryHeap::new()),
                cancelled_timers: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// 添加定时器，返回定时器 ID
    pub fn add_timer(&self, event: Event, delay: Duration) -> TimerId {
        let timer_id = self.inner.timer_id_counter.fetch_add(1, Ordering::Relaxed);
        let timer_event = TimerEvent {
            timer_id,
            event,
            trigger_time: Instant::now() + delay,
        };

        self.inner.timer_heap.lock().push(timer_event);
        self.notify.notify_one();

        trace!("Added timer {} with delay {:?}", timer_id, delay);
        timer_id
    }

    /// 删除定时器（O(1) 惰性删除）
    pub fn del_timer(&self, timer_id: TimerId) {
        self.inner.cancelled_timers.lock().insert(timer_id);
        trace!("Cancelled timer {}", timer_id);
    }

    /// 处理过期定时器，返回触发的事件和下一个定时器的等待时间
    fn process_expired_timers(&self) -> (Vec<Event>, Option<Duration>) {
        let now = Instant::now();
        let mut events = Vec::new();
        let mut timer_heap = self.inner.timer_heap.lock();
        let mut cancelled = self.inner.cancelled_timers.lock();

        while let Some(timer_event) = timer_heap.peek() {
            // 跳过已取消的定时器
            if cancelled.remove(&timer_event.timer_id) {
                timer_heap.pop();
                continue;
            }

            if timer_event.trigger_time <= now {
                let event = timer_heap.pop().unwrap();
                events.push(event.event);
            } else {
                return (events, Some(timer_event.trigger_time - now));
            }
        }

        (events, None)
    }

    /// 清理已取消的定时器集合（定期调用以释放内存）
    fn cleanup_cancelled(&self) {
        let mut cancelled = self.inner.cancelled_timers.lock();
        if cancelled.len() > 1000 {
            let timer_heap = self.inner.timer_heap.lock();
            let active_ids: HashSet<_> = timer_heap.iter().map(|t| t.timer_id).collect();
            cancelled.retain(|id| active_ids.contains(id));
        }
    }
}

/// 发送事件结果
#[derive(Debug)]
pub enum SendEventResult {
    Success,
    SendFailed,
    ChannelFull,
    Stopped,
}

impl SendEventResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, SendEventResult::Success)
    }
}

struct DriverInner {
    timer_service: Timers,
    event_tx: mpsc::Sender<Event>,
    event_rx: tokio::sync::Mutex<mpsc::Receiver<Event>>,
    handler: Mutex<Option<Arc<dyn EventHandler>>>,
    notify: Arc<Notify>,
    stop: AtomicBool,
}

/// 单节点事件驱动器
#[derive(Clone)]
pub struct RaftDriver {
    inner: Arc<DriverInner>,
}

impl RaftDriver {
    pub fn new() -> Self {
        let notify = Arc::new(Notify::new());
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(DriverInner {
                timer_service: Timers::new(notify.clone()),
                event_tx,
                event_rx: tokio::sync::Mutex::new(event_rx),
                handler: Mutex::new(None),
                notify,
                stop: AtomicBool::new(false),
            }),
        }
    }

    /// 获取定时器服务
    pub fn timer_service(&self) -> Timers {
        self.inner.timer_service.clone()
    }

    /// 注册事件处理器（必须在 main_loop 之前调用一次）
    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        *self.inner.handler.lock() = Some(handler);
    }

    /// 停止驱动器
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
        info!("Raft driver stop signal sent");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stop.load(Ordering::Acquire)
    }

    /// 向事件队列投递事件
    pub fn dispatch_event(&self, event: Event) -> SendEventResult {
        if self.is_stopped() {
            return SendEventResult::Stopped;
        }

        match self.inner.event_tx.try_send(event) {
            Ok(_) => {
                self.inner.notify.notify_one();
                SendEventResult::Success
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Raft event channel full, dropping event");
                SendEventResult::ChannelFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendEventResult::SendFailed,
        }
    }

    /// 主循环：处理定时器与事件队列，直到收到停止信号。
    /// 事件处理中的 panic 会被捕获并记录，循环继续运行。
    pub async fn main_loop(&self) {
        info!("Starting raft driver main loop");

        loop {
            if self.is_stopped() {
                info!("Stop signal received, exiting main loop");
                break;
            }

            // 处理过期定时器
            let (expired, wait_duration) = self.inner.timer_service.process_expired_timers();
            for event in expired {
                if !self.dispatch_event(event).is_ok() {
                    debug!("Failed to dispatch expired timer event");
                }
            }
            self.inner.timer_service.cleanup_cancelled();

            // 排空事件队列
            self.drain_events().await;

            if self.is_stopped() {
                info!("Stop signal received, exiting main loop");
                break;
            }

            // 等待：有定时器则等待到期，否则等待唤醒
            if let Some(duration) = wait_duration {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = self.inner.notify.notified() => {}
                }
            } else {
                self.inner.notify.notified().await;
            }
        }
    }

    async fn drain_events(&self) {
        let handler = match self.inner.handler.lock().clone() {
            Some(h) => h,
            None => {
                warn!("Raft driver has no registered handler, dropping events");
                return;
            }
        };

        let mut rx = self.inner.event_rx.lock().await;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    // 捕获事件处理中的 panic：记录后继续下一个事件
                    let fut = handler.handle_event(event);
                    if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        error!(
                            "Raft event handler panicked, restarting loop: {:?}",
                            panic_message(&panic)
                        );
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!("Raft event channel disconnected");
                    break;
                }
            }
        }
    }
}

impl Default for RaftDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::time::sleep;

    #[derive(Clone)]
    struct MockHandleEvent {
        events_received: Arc<std::sync::Mutex<Vec<Event>>>,
        panic_on_heartbeat: bool,
    }

    impl MockHandleEvent {
        fn new() -> Self {
            Self {
                events_received: Arc::new(std::sync::Mutex::new(Vec::new())),
                panic_on_heartbeat: false,
            }
        }

        fn get_events(&self) -> Vec<Event> {
            self.events_received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for MockHandleEvent {
        async fn handle_event(&self, event: Event) {
            if self.panic_on_heartbeat && matches!(event, Event::HeartbeatTimeout) {
                panic!("boom");
            }
            self.events_received.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn test_dispatch_event() {
        let driver = RaftDriver::new();
        let handler = Arc::new(MockHandleEvent::new());
        driver.register(handler.clone());

        let clone = driver.clone();
        tokio::spawn(async move { clone.main_loop().await });

        assert!(driver.dispatch_event(Event::HeartbeatTimeout).is_ok());
        sleep(Duration::from_millis(50)).await;

        assert_eq!(handler.get_events().len(), 1);
        driver.stop();
    }

    #[tokio::test]
    async fn test_timer_fires() {
        let driver = RaftDriver::new();
        let handler = Arc::new(MockHandleEvent::new());
        driver.register(handler.clone());

        let clone = driver.clone();
        tokio::spawn(async move { clone.main_loop().await });

        driver
            .timer_service()
            .add_timer(Event::ElectionTimeout, Duration::from_millis(50));
        sleep(Duration::from_millis(150)).await;

        assert_eq!(handler.get_events().len(), 1);
        driver.stop();
    }

    #[tokio::test]
    async fn test_timer_cancellation() {
        let driver = RaftDriver::new();
        let handler = Arc::new(MockHandleEvent::new());
        driver.register(handler.clone());

        let clone = driver.clone();
        tokio::spawn(async move { clone.main_loop().await });

        let timers = driver.timer_service();
        let timer_id = timers.add_timer(Event::ElectionTimeout, Duration::from_millis(50));
        timers.del_timer(timer_id);

        sleep(Duration::from_millis(150)).await;

        // 定时器已取消，不应收到事件
        assert_eq!(handler.get_events().len(), 0);
        driver.stop();
    }

    #[tokio::test]
    async fn test_panic_in_handler_does_not_kill_loop() {
        let driver = RaftDriver::new();
        let mut handler = MockHandleEvent::new();
        handler.panic_on_heartbeat = true;
        let handler = Arc::new(handler);
        driver.register(handler.clone());

        let clone = driver.clone();
        tokio::spawn(async move { clone.main_loop().await });

        assert!(driver.dispatch_event(Event::HeartbeatTimeout).is_ok());
        sleep(Duration::from_millis(50)).await;

        // panic 被捕获，循环仍可处理后续事件
        assert!(driver.dispatch_event(Event::ElectionTimeout).is_ok());
        sleep(Duration::from_millis(50)).await;

        assert_eq!(handler.get_events().len(), 1);
        driver.stop();
    }

    #[tokio::test]
    async fn test_dispatch_after_stop() {
        let driver = RaftDriver::new();
        driver.stop();
        assert!(matches!(
            driver.dispatch_event(Event::HeartbeatTimeout),
            SendEventResult::Stopped
        ));
    }
}
