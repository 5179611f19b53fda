//! # Stock Metadata Batch
//!
//! 批量为素材文件（图片、视频、矢量图）调用生成式 AI，生成英语 / 印尼语
//! 双语的图库元数据（标题、关键词、分类），并导出为 CSV。
//!
//! ## 架构设计
//!
//! ### ① 数据模型层（Models）
//! - `models/` - 素材文件、工作项状态机、凭证、元数据、图库分类
//! - `loaders` - 从目录加载素材文件
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个文件
//! - `Generator` - 生成能力的抽象（外部协作者）
//! - `LlmService` - 基于 OpenAI 兼容接口的生成实现
//! - `CsvExporter` - 导出 CSV 能力
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/credential_pool` - 多 Key 轮询 + 冷却
//! - `orchestrator/work_queue` - 待处理队列
//! - `orchestrator/scheduler` - 多 worker 调度、完成检测
//! - `orchestrator/batch_processor` - 命令行应用入口

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use config::{Config, Platform, Settings};
pub use error::{ConfigError, GenerateError};
pub use models::{Credential, ItemId, ItemStatus, MediaFile, MediaKind, Metadata, WorkItem};
pub use orchestrator::{App, LogEvent, LogLevel, Scheduler, SchedulerConfig, SchedulerEvent};
pub use services::{CsvExporter, Generator, LlmService};
