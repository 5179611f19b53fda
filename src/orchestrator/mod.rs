//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `credential_pool` - 凭证池
//! - 记录哪些 Key 被占用、哪些在冷却
//! - 轮询指针保证各 Key 轮流使用
//!
//! ### `work_queue` - 待处理队列
//! - 先进先出，支持放回队首 / 排到队尾
//! - 同一个 ID 最多出现一次
//!
//! ### `scheduler` - 多 Key 调度器
//! - 按 Key 数量启动 worker
//! - 节流、冷却、重新排队、永久失败
//! - 完成检测
//!
//! ### `batch_processor` - 命令行应用
//! - 加载配置和素材
//! - 跑一轮调度，导出 CSV，输出统计
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (App)
//!     ↓
//! scheduler (worker 循环 + 完成检测)
//!     ↓                    ↓
//! session (队列 / 凭证池)   services::Generator (单个文件)
//! ```

pub mod batch_processor;
pub mod credential_pool;
pub mod events;
pub mod scheduler;
mod session;
pub mod work_queue;

// 重新导出主要类型
pub use batch_processor::App;
pub use credential_pool::CredentialPool;
pub use events::{LogEvent, LogLevel, SchedulerEvent};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use work_queue::WorkQueue;
