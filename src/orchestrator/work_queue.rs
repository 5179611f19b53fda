//! 待处理队列
//!
//! 先进先出，另有两个特殊入口：
//! - 队首：取出后没有可用 Key，原样放回（从未尝试过）
//! - 队尾：临时失败，重新排队等候

use std::collections::{HashSet, VecDeque};

use crate::models::ItemId;

/// 待处理队列，同一个 ID 在队列中最多出现一次
#[derive(Debug, Default)]
pub struct WorkQueue {
    ids: VecDeque<ItemId>,
    members: HashSet<ItemId>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放到队尾，已在队列中时返回 false
    pub fn push_back(&mut self, id: ItemId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.ids.push_back(id);
        true
    }

    /// 放回队首，已在队列中时返回 false
    pub fn push_front(&mut self, id: ItemId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.ids.push_front(id);
        true
    }

    pub fn pop_front(&mut self) -> Option<ItemId> {
        let id = self.ids.pop_front()?;
        self.members.remove(&id);
        Some(id)
    }

    /// 移除指定 ID（删除文件时使用）
    pub fn remove(&mut self, id: ItemId) -> bool {
        if !self.members.remove(&id) {
            return false;
        }
        self.ids.retain(|queued| *queued != id);
        true
    }

    #[cfg(test)]
    pub fn contains(&self, id: ItemId) -> bool {
        self.members.contains(&id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.members.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// 当前队列顺序的快照
    pub fn snapshot(&self) -> Vec<ItemId> {
        self.ids.iter().copied().collect()
    }
}
