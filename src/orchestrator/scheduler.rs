//! 请求调度器 - 编排层
//!
//! ## 职责
//!
//! 维护单条 FIFO 队列，把出站请求串行地派发给传输层：
//! 同一调度器实例同一时刻只有一个请求在途，相邻两次派发之间
//! 强制隔开最小间隔，瞬时失败按指数退避重试，重试条目重新追加
//! 到队尾（允许被后来的条目超车，用简单性换严格顺序）。
//!
//! 调度器不是全局单例：每个提供商实例各持有一个，
//! 多个调度器并行运行互不共享可变状态。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::clients::{PreparedRequest, ProviderTransport};
use crate::error::ApiError;

/// 调度参数
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 相邻两次派发之间的最小间隔（从上一次派发结束起算）
    pub min_interval: Duration,
    /// 重试退避基准延迟，第 n 次重试等待 base * 2^(n-1)
    pub retry_base_delay: Duration,
    /// 单个条目的最大尝试次数
    pub max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(1000),
            retry_base_delay: Duration::from_millis(500),
            max_attempts: 3,
        }
    }
}

/// 单次派发的结算结果
pub type DispatchResult = Result<Value, ApiError>;

/// 队列条目
///
/// 入队到结算期间归调度器独占，结算后即丢弃。
struct QueueEntry {
    request: PreparedRequest,
    tx: oneshot::Sender<DispatchResult>,
    /// 已执行的尝试次数
    attempts: u32,
}

/// 调度统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub enqueued: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub failed: u64,
}

struct SchedulerInner {
    queue: VecDeque<QueueEntry>,
    /// 派发循环是否在运行
    processing: bool,
    /// 上一次派发结束的时刻，作为限速闸的基准
    last_dispatch_end: Option<Instant>,
    stats: SchedulerStats,
}

/// 请求调度器
///
/// 克隆只是增加同一状态机的引用，不会产生第二条队列。
pub struct RequestScheduler<T> {
    transport: Arc<T>,
    inner: Arc<Mutex<SchedulerInner>>,
    config: SchedulerConfig,
}

impl<T> Clone for RequestScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

impl<T: ProviderTransport + 'static> RequestScheduler<T> {
    /// 创建新的调度器
    pub fn new(transport: T, config: SchedulerConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            inner: Arc::new(Mutex::new(SchedulerInner {
                queue: VecDeque::new(),
                processing: false,
                last_dispatch_end: None,
                stats: SchedulerStats::default(),
            })),
            config,
        }
    }

    /// 提交一个请求，返回等待结算的接收端
    ///
    /// 调用方丢弃接收端即视为放弃结果，派发仍会照常发生
    /// （不支持撤销，已派发的请求无需补偿）。
    pub fn submit(&self, request: PreparedRequest) -> oneshot::Receiver<DispatchResult> {
        let (tx, rx) = oneshot::channel();

        let start_loop = {
            let mut inner = self.lock();
            inner.queue.push_back(QueueEntry {
                request,
                tx,
                attempts: 0,
            });
            inner.stats.enqueued += 1;
            if inner.processing {
                false
            } else {
                inner.processing = true;
                true
            }
        };

        if start_loop {
            let scheduler = self.clone();
            tokio::spawn(async move {
                while scheduler.tick().await {}
            });
        }

        rx
    }

    /// 当前调度统计
    pub fn stats(&self) -> SchedulerStats {
        self.lock().stats.clone()
    }

    /// 当前队列深度
    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// 处理队首的一个条目
    ///
    /// 队列为空时清掉运行标志并返回 false，派发循环随之退出。
    async fn tick(&self) -> bool {
        let entry = {
            let mut inner = self.lock();
            match inner.queue.pop_front() {
                Some(entry) => entry,
                None => {
                    inner.processing = false;
                    return false;
                }
            }
        };

        self.rate_gate().await;

        let result = self.transport.send(&entry.request).await;
        {
            let mut inner = self.lock();
            inner.last_dispatch_end = Some(Instant::now());
            inner.stats.dispatched += 1;
        }

        self.settle(entry, result).await;
        true
    }

    /// 限速闸：距离上一次派发结束不足最小间隔时等待补齐
    async fn rate_gate(&self) {
        let wait = {
            let inner = self.lock();
            inner
                .last_dispatch_end
                .map(|end| self.config.min_interval.saturating_sub(end.elapsed()))
        };
        if let Some(wait) = wait {
            if !wait.is_zero() {
                sleep(wait).await;
            }
        }
    }

    /// 结算一次派发：成功、重试或终态失败
    async fn settle(&self, mut entry: QueueEntry, result: DispatchResult) {
        entry.attempts += 1;

        match result {
            Ok(payload) => {
                self.lock().stats.succeeded += 1;
                let _ = entry.tx.send(Ok(payload));
            }
            Err(err) if err.is_retryable() => {
                if entry.attempts >= self.config.max_attempts {
                    warn!(
                        "请求重试 {} 次后仍然失败，终止: {}",
                        entry.attempts, err
                    );
                    self.lock().stats.failed += 1;
                    let _ = entry.tx.send(Err(ApiError::RetriesExhausted {
                        attempts: entry.attempts,
                        last_error: err.to_string(),
                    }));
                } else {
                    let backoff = self.config.retry_base_delay * 2u32.pow(entry.attempts - 1);
                    warn!(
                        "请求失败（第 {}/{} 次尝试），{:?} 后重新入队: {}",
                        entry.attempts, self.config.max_attempts, backoff, err
                    );
                    self.lock().stats.retried += 1;
                    sleep(backoff).await;
                    // 重新追加到队尾，而不是插回原位
                    self.lock().queue.push_back(entry);
                }
            }
            Err(err) => {
                debug!("请求遇到不可重试的错误，立即结算: {}", err);
                self.lock().stats.failed += 1;
                let _ = entry.tx.send(Err(err));
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
