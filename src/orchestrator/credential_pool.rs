//! 凭证池 - 多 Key 轮询 + 冷却
//!
//! ## 规则
//!
//! - 一个 Key 同一时间只能被一个 worker 占用（busy 集合）
//! - 冷却中的 Key 即使空闲也不会被选中（冷却表：Key → 到期时间）
//! - 每次选中后，轮询指针移到被选中 Key 的下一个位置
//! - 每次选择前先清理已过期的冷却记录
//!
//! 凭证池本身从不报错：选不到 Key 是正常的暂时状态，由调度器稍后重试。
//! 时间由调用方传入，方便测试。

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::models::Credential;

/// 凭证池
#[derive(Debug, Default)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    busy: HashSet<Credential>,
    cooldowns: HashMap<Credential, Instant>,
    cursor: usize,
}

impl CredentialPool {
    #[cfg(test)]
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    /// 替换 Key 列表：清空冷却表，指针归零
    ///
    /// busy 集合保留，正在使用中的 Key 由对应 worker 自己释放。
    pub fn replace(&mut self, credentials: Vec<Credential>) {
        self.credentials = credentials;
        self.cooldowns.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// 从轮询指针开始扫描一整圈，返回第一个既不忙也不在冷却中的 Key
    ///
    /// 不会自动标记占用，调用方需要紧接着调用 [`mark_busy`](Self::mark_busy)。
    pub fn select(&mut self, now: Instant) -> Option<Credential> {
        self.purge_expired(now);

        let len = self.credentials.len();
        for offset in 0..len {
            let index = (self.cursor + offset) % len;
            let credential = &self.credentials[index];
            if self.busy.contains(credential) || self.cooldowns.contains_key(credential) {
                continue;
            }
            self.cursor = (index + 1) % len;
            return Some(credential.clone());
        }
        None
    }

    /// 标记占用，返回是否为新占用
    pub fn mark_busy(&mut self, credential: &Credential) -> bool {
        self.busy.insert(credential.clone())
    }

    /// 释放占用，重复释放无副作用
    pub fn release(&mut self, credential: &Credential) {
        self.busy.remove(credential);
    }

    /// 让 Key 冷却 `duration`，已有记录会被覆盖
    pub fn cooldown(&mut self, credential: &Credential, duration: Duration, now: Instant) {
        self.cooldowns.insert(credential.clone(), now + duration);
    }

    #[cfg(test)]
    pub fn is_busy(&self, credential: &Credential) -> bool {
        self.busy.contains(credential)
    }

    pub fn busy_count(&self) -> usize {
        self.busy.len()
    }

    /// 剩余冷却时间，不在冷却中返回 None
    pub fn cooldown_remaining(&self, credential: &Credential, now: Instant) -> Option<Duration> {
        self.cooldowns
            .get(credential)
            .filter(|until| now <= **until)
            .map(|until| until.saturating_duration_since(now))
    }

    /// 当前仍在冷却中的 Key 数量
    pub fn cooling_count(&self, now: Instant) -> usize {
        self.cooldowns.values().filter(|until| now <= **until).count()
    }

    fn purge_expired(&mut self, now: Instant) {
        self.cooldowns.retain(|_, until| now <= *until);
    }
}
