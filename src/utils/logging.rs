/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::ItemStats;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 决定 info / debug。重复调用无副作用。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 程序配置
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多 Key 批量元数据生成");
    info!("🔑 API Key 数量: {}", config.api_keys.len());
    info!("🤖 模型: {}", config.model_name);
    info!("📂 素材目录: {}", config.input_folder);
    info!("⏱️ 单次调用超时: {} 秒", config.request_timeout().as_secs());
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `stats`: 各状态数量
/// - `exported`: 导出的 CSV 文件
pub fn print_final_stats(stats: &ItemStats, exported: &[PathBuf]) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", stats.completed, stats.total());
    info!("❌ 失败: {}", stats.failed);
    if stats.pending > 0 {
        info!("⏳ 未处理: {}", stats.pending);
    }
    info!("{}", "=".repeat(60));
    for path in exported {
        info!("📄 已导出: {}", path.display());
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
