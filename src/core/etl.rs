use crate::core::Pipeline;
use crate::domain::model::{DeliveryStatus, RunSummary};
use crate::domain::ports::Notifier;
use crate::utils::error::Result;
use crate::utils::monitor::{Phase, SystemMonitor};

pub struct ExportEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
    notifier: Option<Box<dyn Notifier>>,
}

impl<P: Pipeline> ExportEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(false),
            notifier: None,
        }
    }

    pub fn new_with_monitoring(pipeline: P, monitoring_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitoring_enabled),
            notifier: None,
        }
    }

    /// 匯出後寄出附件
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn run(&self) -> Result<RunSummary> {
        tracing::info!("🚀 Starting query export");
        self.monitor.log_stats(Phase::Start);

        let queries = self.pipeline.extract().await?;
        tracing::info!("📄 Loaded {} queries", queries.len());
        self.monitor.log_stats(Phase::Extract);

        let workbook = self.pipeline.transform(queries).await?;
        let failed = workbook.error_count();
        if failed > 0 {
            tracing::warn!(
                "⚠️ {} of {} queries failed, see the *_error sheets",
                failed,
                workbook.sheets.len()
            );
        } else {
            tracing::info!("📊 Built {} sheets", workbook.sheets.len());
        }
        self.monitor.log_stats(Phase::Execute);

        let artifact = self.pipeline.load(workbook).await?;
        tracing::info!("💾 Results saved to {}", artifact.location);
        self.monitor.log_stats(Phase::Export);

        let delivery = match &self.notifier {
            None => DeliveryStatus::Skipped,
            Some(notifier) => match notifier.deliver(&artifact).await {
                Ok(relay) => {
                    tracing::info!("📧 Email sent via {}", relay);
                    DeliveryStatus::Sent { relay }
                }
                // 檔案已存好，寄信失敗不影響結果
                Err(e) => {
                    tracing::error!("❌ {}", e.user_friendly_message());
                    DeliveryStatus::Failed {
                        message: e.to_string(),
                    }
                }
            },
        };

        self.monitor.log_final_stats();

        Ok(RunSummary {
            file_name: artifact.file_name,
            location: artifact.location,
            sheets: artifact.sheets,
            delivery,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{QuerySet, Workbook};
    use crate::domain::model::{ExportArtifact, Sheet, SheetKind};
    use crate::utils::error::ReportError;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct FixedPipeline;

    #[async_trait]
    impl Pipeline for FixedPipeline {
        async fn extract(&self) -> Result<QuerySet> {
            let mut set = QuerySet::new();
            set.insert("Query1", "select 1");
            set.insert("Query2", "select oops");
            Ok(set)
        }

        async fn transform(&self, queries: QuerySet) -> Result<Workbook> {
            let sheets = queries
                .iter()
                .map(|b| {
                    if b.sql.contains("oops") {
                        Sheet::error(format!("{}_error", b.name), "bad column", &b.sql)
                    } else {
                        Sheet::no_data(b.name.clone())
                    }
                })
                .collect();
            Ok(Workbook { sheets })
        }

        async fn load(&self, workbook: Workbook) -> Result<ExportArtifact> {
            Ok(ExportArtifact {
                file_name: "posttest_results_20250101_000000.xlsx".to_string(),
                location: "out/posttest_results_20250101_000000.xlsx".to_string(),
                content_type: "application/octet-stream",
                bytes: vec![1, 2, 3],
                sheets: workbook.sheets.iter().map(Sheet::summary).collect(),
            })
        }
    }

    struct RecordingNotifier {
        delivered: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, artifact: &ExportArtifact) -> Result<String> {
            if self.fail {
                return Err(ReportError::DeliveryError {
                    message: "relay refused".to_string(),
                });
            }
            self.delivered.lock().await.push(artifact.file_name.clone());
            Ok("localhost:25".to_string())
        }
    }

    #[tokio::test]
    async fn test_run_without_notifier_skips_delivery() {
        let engine = ExportEngine::new(FixedPipeline);
        let summary = engine.run().await.unwrap();

        assert_eq!(summary.delivery, DeliveryStatus::Skipped);
        assert_eq!(summary.sheets.len(), 2);
        assert_eq!(summary.sheets[1].kind, SheetKind::Error);
    }

    #[tokio::test]
    async fn test_run_delivers_artifact() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let engine = ExportEngine::new_with_monitoring(FixedPipeline, true).with_notifier(Box::new(
            RecordingNotifier {
                delivered: delivered.clone(),
                fail: false,
            },
        ));

        let summary = engine.run().await.unwrap();

        assert_eq!(
            summary.delivery,
            DeliveryStatus::Sent {
                relay: "localhost:25".to_string()
            }
        );
        assert_eq!(
            *delivered.lock().await,
            vec!["posttest_results_20250101_000000.xlsx".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_fail_the_run() {
        let engine = ExportEngine::new(FixedPipeline).with_notifier(Box::new(RecordingNotifier {
            delivered: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }));

        let summary = engine.run().await.unwrap();
        match summary.delivery {
            DeliveryStatus::Failed { message } => assert!(message.contains("relay refused")),
            other => panic!("unexpected delivery status: {other:?}"),
        }
        assert_eq!(summary.file_name, "posttest_results_20250101_000000.xlsx");
    }
}
