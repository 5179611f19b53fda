//! 调度器对外发布的事件：工作项状态变化 + 日志

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::models::{ItemId, ItemStatus};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// 面向界面的日志条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub time: DateTime<Local>,
    pub message: String,
    pub level: LogLevel,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            time: Local::now(),
            message: message.into(),
            level,
        }
    }

    /// 同步输出到 tracing
    pub(crate) fn trace(&self) {
        match self.level {
            LogLevel::Info | LogLevel::Success => info!("{}", self.message),
            LogLevel::Warning => warn!("{}", self.message),
            LogLevel::Error => error!("{}", self.message),
        }
    }
}

/// 调度器事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// 某个工作项的状态发生变化
    ItemChanged { id: ItemId, status: ItemStatus },
    /// 新的日志条目
    Log(LogEvent),
}
