//! 工作项及其状态机
//!
//! 状态流转：
//!
//! ```text
//! Pending ──▶ Processing ──▶ Completed
//!    ▲            │  │
//!    │            │  └─────▶ Failed
//!    └────────────┘             │
//!   (临时失败重新排队)             │
//!    ▲                          │
//!    └──────────────────────────┘ (重新开始 / 手动重试)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::media::MediaFile;
use crate::models::metadata::{Generated, Metadata};

/// 工作项 ID，在一个会话内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 工作项状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// 等待处理
    Pending,
    /// 某个 worker 正在处理
    Processing,
    /// 已生成元数据
    Completed,
    /// 永久失败
    Failed,
}

impl ItemStatus {
    /// 是否允许从当前状态切换到 `next`
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Failed, Pending)
                | (Completed, Pending)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 一个待生成（或已生成）元数据的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: ItemId,
    pub file: MediaFile,
    pub status: ItemStatus,
    pub metadata: Option<Metadata>,
    pub error: Option<String>,
    pub thumbnail: Option<String>,
}

impl WorkItem {
    pub fn new(id: ItemId, file: MediaFile) -> Self {
        Self {
            id,
            file,
            status: ItemStatus::Pending,
            metadata: None,
            error: None,
            thumbnail: None,
        }
    }

    /// 按状态机切换状态，非法切换返回 false 且不做任何修改
    pub fn transition(&mut self, next: ItemStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// Processing → Completed，写入结果
    pub fn complete(&mut self, generated: Generated) -> bool {
        if !self.transition(ItemStatus::Completed) {
            return false;
        }
        self.metadata = Some(generated.metadata);
        if generated.thumbnail.is_some() {
            self.thumbnail = generated.thumbnail;
        }
        self.error = None;
        true
    }

    /// Processing → Failed，记录错误信息
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.transition(ItemStatus::Failed) {
            return false;
        }
        self.error = Some(error.into());
        true
    }

    /// 回到 Pending（临时失败、重新开始或手动重试），清除上一次的错误
    pub fn reset(&mut self) -> bool {
        if !self.transition(ItemStatus::Pending) {
            return false;
        }
        self.error = None;
        true
    }
}

/// 各状态的数量统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ItemStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }

    pub fn record(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::Pending => self.pending += 1,
            ItemStatus::Processing => self.processing += 1,
            ItemStatus::Completed => self.completed += 1,
            ItemStatus::Failed => self.failed += 1,
        }
    }
}

impl<'a> FromIterator<&'a WorkItem> for ItemStats {
    fn from_iter<I: IntoIterator<Item = &'a WorkItem>>(iter: I) -> Self {
        let mut stats = ItemStats::default();
        for item in iter {
            stats.record(item.status);
        }
        stats
    }
}
