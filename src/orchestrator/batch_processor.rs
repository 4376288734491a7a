//! 批量文档处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责文档分析的调度和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验配置、创建唯一的模型网关
//! 2. **批量加载**：扫描输入目录下所有 `.txt` / `.md` 文档
//! 3. **并发控制**：使用 Semaphore 限制同时分析的文档数量
//! 4. **报告输出**：每份文档写一个 `<文件名>.report.json`
//! 5. **流式分析**：把单份文档的分析过程写成 SSE 帧
//! 6. **全局统计**：汇总成功、降级和失败数量

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::clients::ModelGateway;
use crate::config::Config;
use crate::error::AppError;
use crate::models::AnalysisReport;
use crate::orchestrator::stream_session::{self, FrameSink, SessionOutcome, StreamSession};
use crate::services::{PlainTextSource, TextSource};
use crate::utils::logging::{
    log_document_complete, log_document_start, log_documents_loaded, log_startup,
    print_final_stats,
};
use crate::workflow::{AnalysisOptions, NoopSink, StageOrchestrator};

/// 处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStats {
    pub total: usize,
    pub success: usize,
    /// 成功但走了降级流程
    pub degraded: usize,
    pub failed: usize,
}

/// 应用主结构
pub struct App {
    config: Config,
    gateway: Arc<ModelGateway>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let gateway = ModelGateway::from_config(&config).context("模型网关初始化失败")?;
        log_startup(&config);
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    /// 使用现成的网关创建应用
    pub fn with_gateway(config: Config, gateway: Arc<ModelGateway>) -> Self {
        Self { config, gateway }
    }

    /// 检查模型后端是否可用
    pub async fn check_connection(&self) -> bool {
        self.gateway.test_connection().await
    }

    fn orchestrator(&self, stream: bool) -> StageOrchestrator {
        StageOrchestrator::new(self.gateway.clone(), AnalysisOptions { stream })
    }

    /// 运行批量分析
    pub async fn run(&self) -> Result<ProcessingStats> {
        let documents = self.load_documents().await?;

        if documents.is_empty() {
            warn!("⚠️ 没有找到待分析的文档，程序结束");
            return Ok(ProcessingStats::default());
        }

        log_documents_loaded(documents.len(), self.config.max_concurrent_documents);

        tokio::fs::create_dir_all(&self.config.output_folder)
            .await
            .with_context(|| format!("无法创建输出目录: {}", self.config.output_folder))?;

        let stats = self.process_all_documents(documents).await?;
        print_final_stats(&stats, &self.config.output_folder);
        Ok(stats)
    }

    /// 扫描输入目录
    async fn load_documents(&self) -> Result<Vec<PathBuf>> {
        info!("\n📁 正在扫描待分析的文档...");
        let folder = Path::new(&self.config.input_folder);
        let mut entries = tokio::fs::read_dir(folder)
            .await
            .with_context(|| format!("无法读取输入目录: {}", folder.display()))?;

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_text = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("md"))
                .unwrap_or(false);
            if is_text && path.is_file() {
                documents.push(path);
            }
        }
        documents.sort();
        Ok(documents)
    }

    /// 并发分析所有文档
    async fn process_all_documents(&self, documents: Vec<PathBuf>) -> Result<ProcessingStats> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_documents.max(1)));
        let orchestrator = Arc::new(self.orchestrator(false));
        let output_folder = PathBuf::from(&self.config.output_folder);
        let total = documents.len();

        let mut handles = Vec::with_capacity(total);
        for (idx, path) in documents.into_iter().enumerate() {
            let index = idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;
            let orchestrator = orchestrator.clone();
            let output_folder = output_folder.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                log_document_start(index, total, &path);
                match analyze_document(&orchestrator, &path, &output_folder).await {
                    Ok(report) => {
                        log_document_complete(index, &path, &report);
                        Ok(report.degraded)
                    }
                    Err(e) => {
                        error!("[文档 {}] ❌ 分析过程中发生错误: {:#}", index, e);
                        Err(e)
                    }
                }
            });
            handles.push((index, handle));
        }

        let mut stats = ProcessingStats {
            total,
            ..Default::default()
        };
        for (index, handle) in handles {
            match handle.await {
                Ok(Ok(degraded)) => {
                    stats.success += 1;
                    if degraded {
                        stats.degraded += 1;
                    }
                }
                Ok(Err(_)) => stats.failed += 1,
                Err(e) => {
                    error!("[文档 {}] 任务执行失败: {}", index, e);
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    /// 流式分析单份文档，把 SSE 帧写进 `sink`
    pub async fn stream_document<S>(&self, path: &Path, sink: &mut S) -> Result<SessionOutcome>
    where
        S: FrameSink + ?Sized,
    {
        let document = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = AppError::file_read_failed(path.display().to_string(), e);
                stream_session::send_error(sink, &err.to_string()).await;
                return Err(err.into());
            }
        };

        info!("📄 开始流式分析: {}", path.display());
        let orchestrator = self.orchestrator(self.config.stream);
        let session = StreamSession::new(&orchestrator, self.config.keep_alive_interval());
        Ok(session.run(&PlainTextSource, &document, sink).await)
    }
}

/// 分析一份文档并写出报告
async fn analyze_document(
    orchestrator: &StageOrchestrator,
    path: &Path,
    output_folder: &Path,
) -> Result<AnalysisReport> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
    let text = PlainTextSource.extract_text(&bytes)?;
    let report = orchestrator.analyze(&text, &NoopSink).await?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let report_path = output_folder.join(format!("{}.report.json", stem));
    let json = serde_json::to_string_pretty(&report).context("报告序列化失败")?;
    tokio::fs::write(&report_path, json)
        .await
        .with_context(|| format!("无法写入报告: {}", report_path.display()))?;

    Ok(report)
}
