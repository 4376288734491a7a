/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::path::Path;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::AnalysisReport;
use crate::orchestrator::ProcessingStats;

/// 初始化全局日志
///
/// 优先使用 `RUST_LOG`，否则 `verbose` 时为 debug，默认 info。
/// 日志写到 stderr，stdout 留给流式输出。重复调用不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 文档质量分析模式");
    info!("🤖 模型后端: {:?}", config.provider);
    info!("📊 最大并发数: {}", config.max_concurrent_documents);
    info!(
        "📡 流式输出: {}",
        if config.stream { "开启" } else { "关闭" }
    );
    info!("{}", "=".repeat(60));
}

/// 记录文档加载信息
pub fn log_documents_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 份待分析的文档", total);
    info!("📋 最多同时分析 {} 份\n", max_concurrent);
}

pub fn log_document_start(index: usize, total: usize, path: &Path) {
    info!("📄 [文档 {}/{}] 开始分析: {}", index, total, path.display());
}

/// 记录单份文档的分析结果
pub fn log_document_complete(index: usize, path: &Path, report: &AnalysisReport) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if report.degraded {
        info!(
            "⚠️ [文档 {}] {} 使用降级流程完成: {}",
            index,
            name,
            report.fallback_reason.as_deref().unwrap_or("未知原因")
        );
    } else {
        info!(
            "✓ [文档 {}] {} 分析完成，{} 个段落，{} 个维度",
            index,
            name,
            report.outline.sections.len(),
            report.stages.len()
        );
    }
    if let Some(usage) = report.usage {
        info!("   token 用量: {}", usage.total_tokens);
    }
}

/// 打印最终统计信息
pub fn print_final_stats(stats: &ProcessingStats, output_folder: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", stats.success, stats.total);
    info!("⚠️ 其中降级: {}", stats.degraded);
    info!("❌ 失败: {}", stats.failed);
    info!("{}", "=".repeat(60));
    info!("\n报告已保存至: {}", output_folder);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
