//! CSV 导出服务 - 业务能力层
//!
//! 只负责"把已完成的元数据写成 CSV"能力，不关心流程

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::Platform;
use crate::models::{ItemStatus, Language, StockCategory, WorkItem};

/// CSV 导出服务
///
/// 每种语言一个文件，只包含 Completed 状态的工作项，按显示顺序输出。
pub struct CsvExporter {
    output_folder: PathBuf,
    platform: Platform,
}

impl CsvExporter {
    pub fn new(output_folder: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            output_folder: output_folder.into(),
            platform,
        }
    }

    /// 表头，随平台变化
    fn header(&self) -> [&'static str; 4] {
        match self.platform {
            Platform::Shutterstock => ["Filename", "Description", "Keywords", "Categories"],
            Platform::AdobeStock | Platform::Freepik | Platform::Generic => {
                ["Filename", "Title", "Keywords", "Category"]
            }
        }
    }

    /// Adobe Stock 的分类列要求填写数字代码
    fn category_cell(&self, category: &str) -> String {
        match (self.platform, StockCategory::from_name(category)) {
            (Platform::AdobeStock, Some(known)) => known.code().to_string(),
            _ => category.to_string(),
        }
    }

    /// 生成某一语言的 CSV 内容
    pub fn render(&self, items: &[WorkItem], language: Language) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.header())?;

        for item in items {
            if item.status != ItemStatus::Completed {
                continue;
            }
            let Some(metadata) = &item.metadata else {
                continue;
            };
            let localized = metadata.localized(language);
            writer.write_record([
                item.file.name.as_str(),
                localized.title.as_str(),
                localized.keywords.join(", ").as_str(),
                self.category_cell(&metadata.category).as_str(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("CSV 写入缓冲区失败: {}", e.error()))?;
        Ok(String::from_utf8(bytes)?)
    }

    /// 导出所有语言，返回写出的文件路径；没有已完成的工作项时不写文件
    pub fn export_all(&self, items: &[WorkItem]) -> Result<Vec<PathBuf>> {
        let completed = items
            .iter()
            .filter(|item| item.status == ItemStatus::Completed)
            .count();
        if completed == 0 {
            info!("没有已完成的文件，跳过导出");
            return Ok(Vec::new());
        }

        std::fs::create_dir_all(&self.output_folder).with_context(|| {
            format!("无法创建输出目录: {}", self.output_folder.display())
        })?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let mut written = Vec::new();
        for language in Language::ALL {
            let path = self
                .output_folder
                .join(format!("metadata_{}_{}.csv", language.code(), stamp));
            self.write(&path, items, language)?;
            written.push(path);
        }

        info!("✓ 已导出 {} 条元数据", completed);
        Ok(written)
    }

    fn write(&self, path: &Path, items: &[WorkItem], language: Language) -> Result<()> {
        let content = self.render(items, language)?;
        std::fs::write(path, content)
            .with_context(|| format!("写入 CSV 失败: {}", path.display()))?;
        debug!("写入 {}", path.display());
        Ok(())
    }
}
