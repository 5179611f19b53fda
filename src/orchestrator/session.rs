//! 调度会话 - 调度器持有的全部共享可变状态
//!
//! 工作项、队列、凭证池、当前运行批次、日志都在这里。
//! 调度器只在同步代码段里加锁访问（绝不跨 `.await` 持锁），
//! 所以"取队首 + 选 Key + 标记占用"这一串操作对其他 worker 来说是原子的。

use std::collections::{HashMap, VecDeque};

use tokio::sync::broadcast;

use crate::models::{Generated, ItemId, ItemStats, ItemStatus, MediaFile, WorkItem};
use crate::orchestrator::credential_pool::CredentialPool;
use crate::orchestrator::events::{LogEvent, LogLevel, SchedulerEvent};
use crate::orchestrator::work_queue::WorkQueue;

/// 运行批次 ID，每次开始处理都会分配一个新的
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u64);

#[derive(Debug)]
struct RunState {
    id: RunId,
    /// 尚未退出的 worker 数
    in_flight: usize,
}

pub(crate) struct Session {
    items: HashMap<ItemId, WorkItem>,
    /// 显示顺序
    order: Vec<ItemId>,
    pub(crate) queue: WorkQueue,
    pub(crate) pool: CredentialPool,
    run: Option<RunState>,
    /// Processing 中的工作项由哪个批次发出
    dispatched: HashMap<ItemId, RunId>,
    next_item: u64,
    next_run: u64,
    logs: VecDeque<LogEvent>,
    log_capacity: usize,
    events: broadcast::Sender<SchedulerEvent>,
}

impl Session {
    pub(crate) fn new(events: broadcast::Sender<SchedulerEvent>, log_capacity: usize) -> Self {
        Self {
            items: HashMap::new(),
            order: Vec::new(),
            queue: WorkQueue::new(),
            pool: CredentialPool::default(),
            run: None,
            dispatched: HashMap::new(),
            next_item: 1,
            next_run: 1,
            logs: VecDeque::new(),
            log_capacity,
            events,
        }
    }

    // ========== 工作项 ==========

    pub(crate) fn add_file(&mut self, file: MediaFile) -> ItemId {
        let id = ItemId(self.next_item);
        self.next_item += 1;
        self.items.insert(id, WorkItem::new(id, file));
        self.order.push(id);
        self.emit_status(id, ItemStatus::Pending);
        id
    }

    pub(crate) fn item(&self, id: ItemId) -> Option<&WorkItem> {
        self.items.get(&id)
    }

    /// 按显示顺序遍历
    pub(crate) fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    pub(crate) fn stats(&self) -> ItemStats {
        self.items().collect()
    }

    pub(crate) fn remove_item(&mut self, id: ItemId) -> Option<WorkItem> {
        self.dispatched.remove(&id);
        let item = self.items.remove(&id)?;
        self.order.retain(|existing| *existing != id);
        self.queue.remove(id);
        Some(item)
    }

    pub(crate) fn clear_items(&mut self) {
        self.items.clear();
        self.order.clear();
        self.dispatched.clear();
        self.queue.clear();
    }

    /// 手动重试：Completed / Failed → Pending，清除上次结果，不入队
    pub(crate) fn retry_item(&mut self, id: ItemId) -> bool {
        let Some(item) = self.items.get_mut(&id) else {
            return false;
        };
        if !matches!(item.status, ItemStatus::Completed | ItemStatus::Failed) || !item.reset() {
            return false;
        }
        item.metadata = None;
        item.thumbnail = None;
        self.emit_status(id, ItemStatus::Pending);
        true
    }

    /// 开始一轮处理前填充队列
    ///
    /// 先把所有 Failed 重置为 Pending，再按显示顺序把所有 Pending 放到队尾。
    /// 返回入队数量。
    pub(crate) fn seed_queue(&mut self) -> usize {
        let mut reset = Vec::new();
        for id in &self.order {
            if let Some(item) = self.items.get_mut(id) {
                if item.status == ItemStatus::Failed && item.reset() {
                    reset.push(*id);
                }
            }
        }
        for id in reset {
            self.emit_status(id, ItemStatus::Pending);
        }

        self.queue.clear();
        for id in &self.order {
            if self.items.get(id).map(|item| item.status) == Some(ItemStatus::Pending) {
                self.queue.push_back(*id);
            }
        }
        self.queue.len()
    }

    /// Pending → Processing，返回文件副本供 worker 在锁外使用
    pub(crate) fn begin_item(&mut self, id: ItemId, run: RunId) -> Option<MediaFile> {
        let item = self.items.get_mut(&id)?;
        if !item.transition(ItemStatus::Processing) {
            return None;
        }
        let file = item.file.clone();
        self.dispatched.insert(id, run);
        self.emit_status(id, ItemStatus::Processing);
        Some(file)
    }

    /// Processing → Completed，返回文件名（工作项已被删除时返回 None）
    pub(crate) fn complete_item(&mut self, id: ItemId, generated: Generated) -> Option<String> {
        self.dispatched.remove(&id);
        let item = self.items.get_mut(&id)?;
        if !item.complete(generated) {
            return None;
        }
        let name = item.file.name.clone();
        self.emit_status(id, ItemStatus::Completed);
        Some(name)
    }

    /// Processing → Failed
    pub(crate) fn fail_item(&mut self, id: ItemId, error: String) -> Option<String> {
        self.dispatched.remove(&id);
        let item = self.items.get_mut(&id)?;
        if !item.fail(error) {
            return None;
        }
        let name = item.file.name.clone();
        self.emit_status(id, ItemStatus::Failed);
        Some(name)
    }

    /// Processing → Pending，`enqueue` 为真时排到队尾
    pub(crate) fn requeue_item(&mut self, id: ItemId, enqueue: bool) -> Option<String> {
        self.dispatched.remove(&id);
        let item = self.items.get_mut(&id)?;
        if !item.reset() {
            return None;
        }
        let name = item.file.name.clone();
        if enqueue {
            self.queue.push_back(id);
        }
        self.emit_status(id, ItemStatus::Pending);
        Some(name)
    }

    // ========== 运行批次 ==========

    pub(crate) fn begin_run(&mut self, workers: usize) -> RunId {
        let id = RunId(self.next_run);
        self.next_run += 1;
        self.run = Some(RunState {
            id,
            in_flight: workers,
        });
        id
    }

    pub(crate) fn has_run(&self) -> bool {
        self.run.is_some()
    }

    /// 该批次是否仍是当前批次（未取消、未结束、未被新批次替换）
    pub(crate) fn is_current(&self, run: RunId) -> bool {
        self.run.as_ref().map(|state| state.id) == Some(run)
    }

    pub(crate) fn in_flight(&self, run: RunId) -> Option<usize> {
        self.run
            .as_ref()
            .filter(|state| state.id == run)
            .map(|state| state.in_flight)
    }

    /// worker 退出时调用，返回该批次是否已没有存活的 worker
    pub(crate) fn worker_exited(&mut self, run: RunId) -> bool {
        match self.run.as_mut().filter(|state| state.id == run) {
            Some(state) => {
                state.in_flight = state.in_flight.saturating_sub(1);
                state.in_flight == 0
            }
            None => false,
        }
    }

    /// 是否还有其他批次（已取消或已结束）发出的调用没有返回
    ///
    /// 这些调用返回后，工作项会回到当前批次的队列或直接完成，
    /// 当前批次的 worker 需要等它们落地后才能退出。
    pub(crate) fn has_orphans(&self, run: RunId) -> bool {
        self.dispatched.values().any(|dispatched_by| *dispatched_by != run)
    }

    /// 结束（或取消）当前批次
    pub(crate) fn end_run(&mut self) -> Option<RunId> {
        self.run.take().map(|state| state.id)
    }

    // ========== 日志 ==========

    pub(crate) fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let event = LogEvent::new(level, message);
        event.trace();

        if self.logs.len() >= self.log_capacity {
            self.logs.pop_front();
        }
        self.logs.push_back(event.clone());
        let _ = self.events.send(SchedulerEvent::Log(event));
    }

    pub(crate) fn logs(&self) -> Vec<LogEvent> {
        self.logs.iter().cloned().collect()
    }

    fn emit_status(&self, id: ItemId, status: ItemStatus) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.events.send(SchedulerEvent::ItemChanged { id, status });
    }
}
