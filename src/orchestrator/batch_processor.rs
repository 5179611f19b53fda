//! 批量元数据处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是命令行应用的入口，负责一轮完整的批处理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：输出启动信息、创建 LLM 服务和调度器
//! 2. **批量加载**：扫描素材目录，得到 `Vec<MediaFile>`
//! 3. **调度处理**：交给 [`Scheduler`] 用多个 Key 并发生成
//! 4. **结果导出**：按语言写出 CSV
//! 5. **全局统计**：汇总成功 / 失败数量
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个文件的细节
//! - **向下委托**：单个文件交给 [`Generator`]，并发交给调度器

use crate::config::Config;
use crate::models::{self, MediaFile};
use crate::orchestrator::scheduler::{Scheduler, SchedulerConfig};
use crate::services::{CsvExporter, Generator, LlmService};
use crate::utils::logging;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    scheduler: Scheduler,
}

impl App {
    /// 初始化应用（使用真实的 LLM 服务）
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);

        let generator: Arc<dyn Generator> = Arc::new(LlmService::new(&config));
        Ok(Self::new(config, generator))
    }

    /// 使用指定的生成器创建应用
    pub fn new(config: Config, generator: Arc<dyn Generator>) -> Self {
        let scheduler_config = SchedulerConfig {
            request_timeout: config.request_timeout(),
            ..SchedulerConfig::default()
        };
        Self::with_scheduler_config(config, generator, scheduler_config)
    }

    pub fn with_scheduler_config(
        config: Config,
        generator: Arc<dyn Generator>,
        scheduler_config: SchedulerConfig,
    ) -> Self {
        let scheduler = Scheduler::new(generator, scheduler_config);
        Self { config, scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// 运行应用主逻辑
    ///
    /// 返回导出的 CSV 文件路径
    pub async fn run(&self) -> Result<Vec<PathBuf>> {
        let files = self.load_files().await?;

        if files.is_empty() {
            warn!("⚠️ 没有找到受支持的素材文件，程序结束");
            return Ok(Vec::new());
        }

        log_files_loaded(&files);

        self.scheduler.set_credentials(self.config.api_keys.clone());
        self.scheduler.set_settings(self.config.settings.clone());
        self.scheduler.add_files(files);

        if !self.scheduler.start_processing() {
            anyhow::bail!("无法开始处理，请检查 API Key 配置");
        }
        self.scheduler.wait_until_idle().await;

        let exporter = CsvExporter::new(&self.config.output_folder, self.config.settings.platform);
        let exported = exporter.export_all(&self.scheduler.items())?;

        logging::print_final_stats(&self.scheduler.stats(), &exported);

        Ok(exported)
    }

    /// 加载素材
    async fn load_files(&self) -> Result<Vec<MediaFile>> {
        info!("\n📁 正在扫描素材目录...");
        models::load_media_folder(&self.config.input_folder).await
    }
}

// ========== 日志辅助函数 ==========

fn log_files_loaded(files: &[MediaFile]) {
    let previews = files.iter().filter(|f| f.preview.is_some()).count();
    info!("✓ 找到 {} 个待处理的文件", files.len());
    if previews > 0 {
        info!("🖼️ 其中 {} 个带有预览图", previews);
    }
}
