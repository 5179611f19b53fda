//! 多 Key 调度器 - 编排层
//!
//! ## 职责
//!
//! 用 N 个并发 worker 消费待处理队列，每个 worker 借用一个 Key 调用生成器，
//! 根据结果更新工作项状态。
//!
//! ## worker 循环
//!
//! 1. 批次已取消 → 退出
//! 2. 取队首；队列为空 → 完成检测，退出（已取消批次的调用还没返回时先等待）
//! 3. 选 Key；没有可用 Key → 放回队首，等 1 秒再试（节流，不算失败）
//! 4. 标记 Key 占用，工作项 → Processing，调用生成器（超时按凭证耗尽类处理）
//! 5. 成功 → Completed，释放 Key，立即进入下一轮
//! 6. 失败 → 释放 Key：
//!    - 凭证耗尽类：工作项回到 Pending 并排到队尾，Key 冷却 30 秒
//!    - 永久类：工作项 → Failed，记录错误，不再排队
//!
//! ## 并发模型
//!
//! 同一批次的所有 worker 在同一个 tokio 任务里 `join_all`，协作式交替执行，
//! 只会在生成调用和固定等待处让出。共享状态集中在 [`Session`] 中，
//! 只在同步代码段里加锁。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error};

use crate::config::Settings;
use crate::error::GenerateError;
use crate::models::{Credential, Generated, ItemId, ItemStats, MediaFile, WorkItem};
use crate::orchestrator::events::{LogEvent, LogLevel, SchedulerEvent};
use crate::orchestrator::session::{RunId, Session};
use crate::services::Generator;

/// 调度参数
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// 没有可用 Key 时的等待时间
    pub throttle_delay: Duration,
    /// 凭证耗尽类错误后的冷却时间
    pub cooldown: Duration,
    /// 完成检测的宽限时间
    pub completion_grace: Duration,
    /// 单次生成调用的超时时间
    pub request_timeout: Duration,
    /// worker 数量下限
    pub min_workers: usize,
    /// worker 数量上限
    pub max_workers: usize,
    /// 每个 Key 对应的 worker 数
    pub workers_per_credential: usize,
    /// 保留的日志条数
    pub log_capacity: usize,
    /// 事件通道容量
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            throttle_delay: Duration::from_secs(1),
            cooldown: Duration::from_secs(30),
            completion_grace: Duration::from_millis(800),
            request_timeout: Duration::from_secs(120),
            min_workers: 2,
            max_workers: 20,
            workers_per_credential: 2,
            log_capacity: 200,
            event_capacity: 1024,
        }
    }
}

impl SchedulerConfig {
    /// worker 数量 = clamp(Key 数 × 2, 2, 20)
    pub fn worker_count(&self, credentials: usize) -> usize {
        credentials
            .saturating_mul(self.workers_per_credential)
            .clamp(self.min_workers, self.max_workers.max(self.min_workers))
    }
}

/// 多 Key 调度器
///
/// 克隆代价很低，所有克隆共享同一个会话。
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    session: Mutex<Session>,
    settings: Mutex<Arc<Settings>>,
    generator: Arc<dyn Generator>,
    config: SchedulerConfig,
    events: broadcast::Sender<SchedulerEvent>,
    processing: watch::Sender<bool>,
}

/// worker 单轮的决策结果
enum Step {
    /// 队列已空
    Drained,
    /// 没有可用 Key
    Throttled,
    /// 队列已空，但已取消批次发出的调用还没返回
    Waiting,
    /// 拿到了工作项和 Key
    Generate {
        id: ItemId,
        credential: Credential,
        file: MediaFile,
    },
}

impl Scheduler {
    pub fn new(generator: Arc<dyn Generator>, config: SchedulerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (processing, _) = watch::channel(false);
        let session = Session::new(events.clone(), config.log_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(session),
                settings: Mutex::new(Arc::new(Settings::default())),
                generator,
                config,
                events,
                processing,
            }),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ========== 会话管理 ==========

    /// 替换 Key 列表（冷却清空、轮询指针归零）
    pub fn set_credentials<I, C>(&self, credentials: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Credential>,
    {
        let credentials: Vec<Credential> = credentials.into_iter().map(Into::into).collect();
        let mut session = self.session();
        let count = credentials.len();
        session.pool.replace(credentials);
        session.log(LogLevel::Info, format!("🔑 已配置 {} 个 API Key", count));
    }

    pub fn set_settings(&self, settings: Settings) {
        *self
            .inner
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.inner
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 接收文件，全部以 Pending 状态加入会话
    pub fn add_files(&self, files: impl IntoIterator<Item = MediaFile>) -> Vec<ItemId> {
        let mut session = self.session();
        let ids: Vec<ItemId> = files.into_iter().map(|file| session.add_file(file)).collect();
        if !ids.is_empty() {
            session.log(LogLevel::Info, format!("📁 添加了 {} 个文件", ids.len()));
        }
        ids
    }

    /// 删除单个文件，正在处理中的调用结果会被丢弃
    pub fn delete_item(&self, id: ItemId) -> bool {
        let mut session = self.session();
        match session.remove_item(id) {
            Some(item) => {
                session.log(LogLevel::Info, format!("🗑️ 已删除 {}", item.file.name));
                true
            }
            None => false,
        }
    }

    /// 手动重试：Completed / Failed → Pending
    ///
    /// 只修改状态，不会入队；下次 [`start_processing`](Self::start_processing) 时才会被处理。
    pub fn retry_item(&self, id: ItemId) -> bool {
        let mut session = self.session();
        if !session.retry_item(id) {
            return false;
        }
        if let Some(name) = session.item(id).map(|item| item.file.name.clone()) {
            session.log(LogLevel::Info, format!("🔁 {} 已重置为待处理", name));
        }
        true
    }

    /// 取消当前批次：worker 在下一轮开始时退出，已发出的调用不会被中断
    pub fn cancel(&self) -> bool {
        let mut session = self.session();
        if session.end_run().is_none() {
            return false;
        }
        session.queue.clear();
        session.log(LogLevel::Warning, "⏹️ 处理已停止");
        self.inner.processing.send_replace(false);
        true
    }

    /// 取消当前批次并清空所有文件
    pub fn clear_all(&self) {
        let mut session = self.session();
        session.end_run();
        session.clear_items();
        session.log(LogLevel::Info, "🧹 已清空所有文件");
        self.inner.processing.send_replace(false);
    }

    // ========== 查询 ==========

    pub fn item(&self, id: ItemId) -> Option<WorkItem> {
        self.session().item(id).cloned()
    }

    /// 按显示顺序返回所有工作项
    pub fn items(&self) -> Vec<WorkItem> {
        self.session().items().cloned().collect()
    }

    pub fn stats(&self) -> ItemStats {
        self.session().stats()
    }

    pub fn logs(&self) -> Vec<LogEvent> {
        self.session().logs()
    }

    /// 当前队列顺序
    pub fn queued(&self) -> Vec<ItemId> {
        self.session().queue.snapshot()
    }

    /// Key 的剩余冷却时间
    pub fn cooldown_remaining(&self, credential: &Credential) -> Option<Duration> {
        self.session()
            .pool
            .cooldown_remaining(credential, Instant::now())
    }

    pub fn is_processing(&self) -> bool {
        *self.inner.processing.borrow()
    }

    /// 订阅状态变化和日志
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    /// 订阅"处理中"标志
    pub fn watch_processing(&self) -> watch::Receiver<bool> {
        self.inner.processing.subscribe()
    }

    /// 等待当前批次结束（没有批次时立即返回）
    pub async fn wait_until_idle(&self) {
        let mut processing = self.watch_processing();
        let _ = processing.wait_for(|running| !*running).await;
    }

    // ========== 调度 ==========

    /// 开始处理
    ///
    /// 把 Failed 重置为 Pending，按显示顺序填充队列，然后启动 worker。
    /// 返回是否真的启动了一个新批次。
    pub fn start_processing(&self) -> bool {
        let (run, workers) = {
            let mut session = self.session();

            if session.pool.is_empty() {
                session.log(LogLevel::Error, "❌ 未配置任何 API Key，无法开始处理");
                return false;
            }
            if session.has_run() {
                session.log(LogLevel::Warning, "⚠️ 已有任务在处理中");
                return false;
            }

            let queued = session.seed_queue();
            if queued == 0 {
                session.log(LogLevel::Info, "没有待处理的文件");
                return false;
            }

            let keys = session.pool.len();
            let workers = self.inner.config.worker_count(keys);
            let run = session.begin_run(workers);
            session.log(
                LogLevel::Info,
                format!(
                    "🚀 开始处理 {} 个文件（{} 个 Key，{} 个 worker）",
                    queued, keys, workers
                ),
            );
            self.inner.processing.send_replace(true);
            (run, workers)
        };

        let settings = self.settings();
        let scheduler = self.clone();
        tokio::spawn(async move {
            let loops = (0..workers).map(|worker| scheduler.run_worker(run, worker, settings.clone()));
            join_all(loops).await;
        });

        true
    }

    /// 单个 worker 的循环
    async fn run_worker(&self, run: RunId, worker: usize, settings: Arc<Settings>) {
        debug!("[worker {}] 启动", worker);

        loop {
            let step = match self.next_step(run) {
                Some(step) => step,
                None => {
                    debug!("[worker {}] 批次已取消，退出", worker);
                    return;
                }
            };

            match step {
                Step::Drained => {
                    debug!("[worker {}] 队列已空，退出", worker);
                    self.finish_worker(run).await;
                    return;
                }
                Step::Throttled | Step::Waiting => {
                    sleep(self.inner.config.throttle_delay).await;
                }
                Step::Generate {
                    id,
                    credential,
                    file,
                } => {
                    debug!(
                        "[worker {}] 处理 {} ({})，Key {}",
                        worker, id, file.name, credential
                    );
                    let limit = self.inner.config.request_timeout;
                    let outcome = timeout(
                        limit,
                        self.inner.generator.generate(&file, &settings, &credential),
                    )
                    .await
                    .unwrap_or_else(|_| {
                        Err(GenerateError::Timeout(format!(
                            "{} 超过 {} 秒未返回",
                            file.name,
                            limit.as_secs()
                        )))
                    });
                    self.settle(id, &credential, outcome);
                }
            }
        }
    }

    /// 同步决策：取队首 → 选 Key → 标记占用 → Processing
    ///
    /// 批次已不是当前批次时返回 None。
    fn next_step(&self, run: RunId) -> Option<Step> {
        let mut session = self.session();

        loop {
            if !session.is_current(run) {
                return None;
            }

            let Some(id) = session.queue.pop_front() else {
                if session.has_orphans(run) {
                    return Some(Step::Waiting);
                }
                return Some(Step::Drained);
            };

            let now = Instant::now();
            let Some(credential) = session.pool.select(now) else {
                session.queue.push_front(id);
                debug!(
                    "没有可用 Key（占用 {}，冷却 {}），{} 放回队首",
                    session.pool.busy_count(),
                    session.pool.cooling_count(now),
                    id
                );
                return Some(Step::Throttled);
            };

            if !session.pool.mark_busy(&credential) {
                error!("Key {} 已被占用却仍被选中", credential);
            }

            match session.begin_item(id, run) {
                Some(file) => {
                    return Some(Step::Generate {
                        id,
                        credential,
                        file,
                    })
                }
                None => {
                    // 队列里的工作项不在 Pending 状态，丢弃这次出队
                    session.pool.release(&credential);
                }
            }
        }
    }

    /// 根据生成结果更新工作项和 Key
    ///
    /// 凭证耗尽类失败的工作项放回当前批次的队尾；发出调用的批次已被取消时也一样，
    /// 只有没有任何批次在运行时才只改回 Pending，等下一次开始处理。
    fn settle(
        &self,
        id: ItemId,
        credential: &Credential,
        outcome: Result<Generated, GenerateError>,
    ) {
        let mut session = self.session();
        session.pool.release(credential);

        match outcome {
            Ok(generated) => {
                if let Some(name) = session.complete_item(id, generated) {
                    session.log(LogLevel::Success, format!("✅ {} 生成完成", name));
                }
            }
            Err(err) if err.is_credential_exhaustion() => {
                session
                    .pool
                    .cooldown(credential, self.inner.config.cooldown, Instant::now());
                let enqueue = session.has_run();
                let name = session.requeue_item(id, enqueue);
                session.log(
                    LogLevel::Warning,
                    format!(
                        "⚠️ Key {} 暂不可用，冷却 {} 秒: {}{}",
                        credential,
                        self.inner.config.cooldown.as_secs(),
                        err,
                        name.map(|n| format!("（{} 重新排队）", n))
                            .unwrap_or_default()
                    ),
                );
            }
            Err(err) => {
                if let Some(name) = session.fail_item(id, err.to_string()) {
                    session.log(LogLevel::Error, format!("❌ {} 处理失败: {}", name, err));
                }
            }
        }
    }

    /// 完成检测
    ///
    /// 最后一个退出的 worker 等待一个宽限期后再次确认队列为空、没有存活 worker，
    /// 才把"处理中"标志置为 false。宽限期用来吸收其他 worker 正要把失败项放回队列的竞争。
    async fn finish_worker(&self, run: RunId) {
        if !self.session().worker_exited(run) {
            return;
        }

        sleep(self.inner.config.completion_grace).await;

        let mut session = self.session();
        let idle = session.queue.is_empty()
            && session.in_flight(run) == Some(0)
            && !session.has_orphans(run);
        if !idle {
            return;
        }

        session.end_run();
        let stats = session.stats();
        let cooling = session.pool.cooling_count(Instant::now());
        session.log(
            LogLevel::Success,
            format!(
                "🏁 全部处理完成: 成功 {}，失败 {}，待处理 {}，冷却中的 Key {}",
                stats.completed, stats.failed, stats.pending, cooling
            ),
        );
        self.inner.processing.send_replace(false);
    }
}
