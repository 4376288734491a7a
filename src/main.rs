use std::path::{Path, PathBuf};

use anyhow::Result;
use doc_quality_analyzer::orchestrator::AsyncWriteSink;
use doc_quality_analyzer::utils::logging;
use doc_quality_analyzer::{App, Config};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置：优先使用 CONFIG_FILE 指定的 toml，否则读环境变量
    let config = match std::env::var("CONFIG_FILE") {
        Ok(path) => Config::from_toml_file(Path::new(&path))?,
        Err(_) => Config::from_env()?,
    };

    // 初始化日志
    logging::init(config.verbose_logging);

    let app = App::initialize(config).await?;

    // 带文件参数时流式分析单份文档，结果写到 stdout
    if let Some(path) = std::env::args().nth(1).map(PathBuf::from) {
        let mut sink = AsyncWriteSink::new(tokio::io::stdout());
        let outcome = app.stream_document(&path, &mut sink).await?;
        if outcome.report.is_none() {
            error!("❌ 文档分析没有产生报告");
        }
        return Ok(());
    }

    if !app.check_connection().await {
        error!("❌ 无法连接模型服务，请检查 API 配置");
    }
    let stats = app.run().await?;
    info!("处理结束: {}/{} 成功", stats.success, stats.total);

    Ok(())
}
