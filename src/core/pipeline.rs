use crate::adapters::workbook::writer_for;
use crate::core::parser::{parse_queries, single_query};
use crate::core::placeholder::{substitute_window, unresolved_placeholders};
use crate::core::sheet_name::SheetNamer;
use crate::core::timezone::{targets_database, TimeWindow, Zone};
use crate::core::{ConfigProvider, Database, Pipeline, QuerySet, Storage, Workbook, WorkbookWriter};
use crate::domain::model::{
    ErrorPolicy, ExportArtifact, ParseMode, PlaceholderStyle, QueryBlock, QuerySource, Sheet,
};
use crate::utils::error::{ReportError, Result};

/// 讀取查詢、替換時間標記、逐一執行並寫出活頁簿
pub struct QueryPipeline<S: Storage, D: Database, C: ConfigProvider> {
    storage: S,
    database: D,
    config: C,
    source: QuerySource,
    writer: Box<dyn WorkbookWriter>,
}

impl<S: Storage, D: Database, C: ConfigProvider> QueryPipeline<S, D, C> {
    pub fn new(storage: S, database: D, config: C, source: QuerySource) -> Self {
        let writer = writer_for(config.output_format());
        Self {
            storage,
            database,
            config,
            source,
            writer,
        }
    }

    /// 目標時區為 "database" 時需要先問資料庫
    pub async fn resolve_window(&self) -> Result<TimeWindow> {
        let options = self.config.time_options();
        if !targets_database(options) {
            return TimeWindow::resolve(options, None);
        }

        let info = self.database.session_info().await?;
        let reported = info
            .database_timezone
            .or(info.session_timezone)
            .ok_or_else(|| ReportError::ConfigError {
                message: format!("{} did not report a timezone", self.database.backend()),
            })?;
        let zone = Zone::parse(&reported)?;
        tracing::debug!("Database reports timezone {}", zone);
        TimeWindow::resolve(options, Some(&zone))
    }

    fn file_name(&self) -> String {
        format!(
            "{}_{}.{}",
            self.config.file_prefix(),
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            self.writer.format().extension()
        )
    }
}

/// 檔案依解析模式切割；單一查詢整段當成一個區塊
pub async fn load_queries(source: &QuerySource, mode: ParseMode) -> Result<QuerySet> {
    let queries = match source {
        QuerySource::File(path) => {
            tracing::debug!("Reading queries from {}", path.display());
            let raw = tokio::fs::read(path).await?;
            // 非 UTF-8 的位元組直接替換掉
            let text = String::from_utf8_lossy(&raw);
            parse_queries(&text, mode)
        }
        QuerySource::Inline(sql) => single_query(sql),
    };

    if queries.is_empty() {
        return Err(ReportError::NoQueriesError {
            origin: source.to_string(),
        });
    }
    Ok(queries)
}

/// 把時間區間套進每個查詢，並對剩下的標記發出警告
pub fn prepare_queries(
    queries: QuerySet,
    window: &TimeWindow,
    style: PlaceholderStyle,
) -> Vec<QueryBlock> {
    queries
        .into_iter()
        .map(|block| {
            let sql = substitute_window(&block.sql, window, style);
            let unresolved = unresolved_placeholders(&sql);
            if !unresolved.is_empty() {
                tracing::warn!(
                    "⚠️ {} still contains {} (no value supplied)",
                    block.name,
                    unresolved.join(", ")
                );
            }
            QueryBlock {
                name: block.name,
                sql,
            }
        })
        .collect()
}

/// 不連線，只解析並替換時間標記；目標時區為 database 時標記原樣保留
pub async fn dry_run_blocks<C: ConfigProvider>(
    config: &C,
    source: &QuerySource,
) -> Result<Vec<QueryBlock>> {
    let queries = load_queries(source, config.parse_mode()).await?;
    let options = config.time_options();

    let window = if targets_database(options) {
        tracing::warn!("⚠️ Target timezone 'database' needs a connection, placeholders are left as is");
        TimeWindow::default()
    } else {
        TimeWindow::resolve(options, None)?
    };
    log_window(&window);

    Ok(prepare_queries(queries, &window, options.placeholder_style))
}

pub fn log_window(window: &TimeWindow) {
    for (label, time) in [("start", &window.start), ("end", &window.end)] {
        let Some(time) = time else {
            continue;
        };
        match (&window.input_zone, &window.target_zone) {
            (Some(from), Some(to)) => tracing::info!(
                "🕒 Test {} time {} ({}) → {} ({})",
                label,
                time.input,
                from,
                time.value,
                to
            ),
            _ => tracing::info!("🕒 Test {} time {}", label, time.value),
        }
        for (zone, value) in &time.display {
            tracing::info!("   {}: {}", zone, value);
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage, D: Database, C: ConfigProvider> Pipeline for QueryPipeline<S, D, C> {
    async fn extract(&self) -> Result<QuerySet> {
        let queries = load_queries(&self.source, self.config.parse_mode()).await?;
        tracing::debug!("Parsed queries: {}", queries.names().join(", "));
        Ok(queries)
    }

    async fn transform(&self, queries: QuerySet) -> Result<Workbook> {
        if let Some(zone) = self.config.session_timezone() {
            let zone = Zone::parse(zone)?;
            self.database.set_session_timezone(&zone.name()).await?;
            tracing::info!("🌐 Session timezone set to {}", zone);
        }

        let window = self.resolve_window().await?;
        log_window(&window);

        let policy = self.config.error_policy();
        let blocks = prepare_queries(queries, &window, self.config.time_options().placeholder_style);
        let mut namer = SheetNamer::new();
        let mut workbook = Workbook::default();

        for block in blocks {
            tracing::debug!("Executing {}:\n{}", block.name, block.sql);

            match self.database.fetch(&block.sql).await {
                Ok(result) => {
                    if result.has_columns() {
                        tracing::info!("✅ {} returned {} rows", block.name, result.row_count());
                    } else {
                        tracing::info!("✅ {} executed (no result set)", block.name);
                    }
                    workbook
                        .sheets
                        .push(Sheet::from_result(namer.assign(&block.name), result));
                }
                Err(e) => {
                    let message = match &e {
                        ReportError::DatabaseError(inner) => inner.to_string(),
                        other => other.to_string(),
                    };
                    if policy == ErrorPolicy::Abort {
                        return Err(ReportError::QueryFailedError {
                            name: block.name,
                            message,
                        });
                    }
                    tracing::error!("❌ {} failed: {}", block.name, message);
                    let name = namer.assign(&format!("{}_error", block.name));
                    workbook
                        .sheets
                        .push(Sheet::error(name, &message, &block.sql));
                }
            }
        }

        Ok(workbook)
    }

    async fn load(&self, workbook: Workbook) -> Result<ExportArtifact> {
        let bytes = self.writer.render(&workbook)?;
        let file_name = self.file_name();

        tracing::debug!("Writing {} ({} bytes) to storage", file_name, bytes.len());
        self.storage.write_file(&file_name, &bytes).await?;

        Ok(ExportArtifact {
            location: self.storage.location(&file_name),
            file_name,
            content_type: self.writer.format().content_type(),
            bytes,
            sheets: workbook.sheets.iter().map(Sheet::summary).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        Cell, OutputFormat, ResultSet, SessionInfo, SheetKind, TimeOptions,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        fn location(&self, path: &str) -> String {
            format!("memory://{}", path)
        }
    }

    /// 記錄收到的 SQL；含 "boom" 的語句會失敗
    #[derive(Clone, Default)]
    struct MockDatabase {
        executed: Arc<Mutex<Vec<String>>>,
        session_zone: Arc<Mutex<Option<String>>>,
        reported_zone: Option<String>,
    }

    #[async_trait]
    impl Database for MockDatabase {
        fn backend(&self) -> &'static str {
            "mock"
        }

        async fn session_info(&self) -> Result<SessionInfo> {
            Ok(SessionInfo {
                backend: "mock".to_string(),
                database_timezone: self.reported_zone.clone(),
                session_timezone: self.session_zone.lock().await.clone(),
                current_time: None,
            })
        }

        async fn set_session_timezone(&self, zone: &str) -> Result<()> {
            *self.session_zone.lock().await = Some(zone.to_string());
            Ok(())
        }

        async fn fetch(&self, sql: &str) -> Result<ResultSet> {
            self.executed.lock().await.push(sql.to_string());
            if sql.contains("boom") {
                return Err(ReportError::DatabaseError(sqlx::Error::Protocol(
                    "table boom does not exist".to_string(),
                )));
            }
            if sql.starts_with("delete") {
                return Ok(ResultSet::default());
            }
            Ok(ResultSet {
                columns: vec!["id".to_string(), "label".to_string()],
                rows: vec![vec![Cell::Int(1), Cell::from("one")]],
            })
        }
    }

    struct MockConfig {
        output_format: OutputFormat,
        error_policy: ErrorPolicy,
        time: TimeOptions,
        session_timezone: Option<String>,
    }

    impl Default for MockConfig {
        fn default() -> Self {
            Self {
                output_format: OutputFormat::CsvZip,
                error_policy: ErrorPolicy::Sheet,
                time: TimeOptions::default(),
                session_timezone: None,
            }
        }
    }

    impl ConfigProvider for MockConfig {
        fn output_path(&self) -> &str {
            "test_output"
        }

        fn output_format(&self) -> OutputFormat {
            self.output_format
        }

        fn file_prefix(&self) -> &str {
            "posttest_results"
        }

        fn parse_mode(&self) -> ParseMode {
            ParseMode::Auto
        }

        fn error_policy(&self) -> ErrorPolicy {
            self.error_policy
        }

        fn time_options(&self) -> &TimeOptions {
            &self.time
        }

        fn session_timezone(&self) -> Option<&str> {
            self.session_timezone.as_deref()
        }
    }

    fn pipeline(
        config: MockConfig,
        source: QuerySource,
    ) -> (QueryPipeline<MockStorage, MockDatabase, MockConfig>, MockStorage, MockDatabase) {
        let storage = MockStorage::default();
        let database = MockDatabase::default();
        let pipeline = QueryPipeline::new(storage.clone(), database.clone(), config, source);
        (pipeline, storage, database)
    }

    #[tokio::test]
    async fn test_extract_from_file_parses_blocks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"-- Query1\nselect 1;\n-- Query2\nselect 2;\n")
            .unwrap();

        let (pipeline, _, _) = pipeline(
            MockConfig::default(),
            QuerySource::File(file.path().to_path_buf()),
        );
        let queries = pipeline.extract().await.unwrap();

        assert_eq!(queries.names(), vec!["Query1", "Query2"]);
    }

    #[tokio::test]
    async fn test_extract_tolerates_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"select '\xff' from dual").unwrap();

        let (pipeline, _, _) = pipeline(
            MockConfig::default(),
            QuerySource::File(file.path().to_path_buf()),
        );
        let queries = pipeline.extract().await.unwrap();
        assert_eq!(queries.names(), vec!["Result"]);
    }

    #[tokio::test]
    async fn test_extract_without_queries_fails() {
        let (pipeline, _, _) = pipeline(
            MockConfig::default(),
            QuerySource::Inline("  ;  ".to_string()),
        );
        let err = pipeline.extract().await.unwrap_err();
        assert!(matches!(err, ReportError::NoQueriesError { .. }));
    }

    #[tokio::test]
    async fn test_transform_substitutes_converted_times() {
        let config = MockConfig {
            time: TimeOptions {
                start: Some("2025-01-15 10:00:00".to_string()),
                end: Some("2025-01-15 12:00:00".to_string()),
                input_timezone: Some("Asia/Kolkata".to_string()),
                target_timezone: Some("US/Central".to_string()),
                placeholder_style: PlaceholderStyle::Quoted,
                ..TimeOptions::default()
            },
            ..MockConfig::default()
        };
        let (pipeline, _, database) = pipeline(
            config,
            QuerySource::Inline(
                "select * from t where ts between &test_start_time and &test_end_time".to_string(),
            ),
        );

        let queries = pipeline.extract().await.unwrap();
        let workbook = pipeline.transform(queries).await.unwrap();

        assert_eq!(workbook.sheets.len(), 1);
        assert_eq!(workbook.sheets[0].name, "Result");
        let executed = database.executed.lock().await;
        assert_eq!(
            executed[0],
            "select * from t where ts between '2025-01-14 22:30:00' and '2025-01-15 00:30:00'"
        );
    }

    #[tokio::test]
    async fn test_transform_records_failures_as_error_sheets() {
        let mut queries = QuerySet::new();
        queries.insert("Query1", "select 1");
        queries.insert("Query2", "select * from boom");
        queries.insert("Query3", "delete from t");

        let (pipeline, _, database) =
            pipeline(MockConfig::default(), QuerySource::Inline(String::new()));
        let workbook = pipeline.transform(queries).await.unwrap();

        let names: Vec<_> = workbook.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Query1", "Query2_error", "Query3"]);
        assert_eq!(workbook.sheets[1].kind, SheetKind::Error);
        assert_eq!(workbook.sheets[1].columns, vec!["Error", "SQL"]);
        assert_eq!(workbook.sheets[1].rows[0][1], Cell::from("select * from boom"));
        assert_eq!(workbook.sheets[2].kind, SheetKind::Empty);
        // 失敗之後仍繼續執行
        assert_eq!(database.executed.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn test_transform_abort_policy_stops_at_first_failure() {
        let mut queries = QuerySet::new();
        queries.insert("Query1", "select * from boom");
        queries.insert("Query2", "select 2");

        let config = MockConfig {
            error_policy: ErrorPolicy::Abort,
            ..MockConfig::default()
        };
        let (pipeline, _, database) = pipeline(config, QuerySource::Inline(String::new()));
        let err = pipeline.transform(queries).await.unwrap_err();

        match err {
            ReportError::QueryFailedError { name, message } => {
                assert_eq!(name, "Query1");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(database.executed.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_transform_sets_session_timezone() {
        let config = MockConfig {
            session_timezone: Some("Asia/Kolkata".to_string()),
            ..MockConfig::default()
        };
        let (pipeline, _, database) = pipeline(config, QuerySource::Inline(String::new()));
        let mut queries = QuerySet::new();
        queries.insert("Result", "select 1");

        pipeline.transform(queries).await.unwrap();
        assert_eq!(
            database.session_zone.lock().await.as_deref(),
            Some("Asia/Kolkata")
        );
    }

    #[tokio::test]
    async fn test_database_target_uses_reported_zone() {
        let config = MockConfig {
            time: TimeOptions {
                start: Some("2025-01-15 10:00:00".to_string()),
                input_timezone: Some("UTC".to_string()),
                target_timezone: Some("database".to_string()),
                ..TimeOptions::default()
            },
            ..MockConfig::default()
        };
        let storage = MockStorage::default();
        let database = MockDatabase {
            reported_zone: Some("-05:00".to_string()),
            ..MockDatabase::default()
        };
        let pipeline = QueryPipeline::new(storage, database, config, QuerySource::Inline(String::new()));

        let window = pipeline.resolve_window().await.unwrap();
        assert_eq!(window.start_value(), Some("2025-01-15 05:00:00"));
    }

    #[tokio::test]
    async fn test_load_writes_named_artifact() {
        let (pipeline, storage, _) =
            pipeline(MockConfig::default(), QuerySource::Inline(String::new()));
        let workbook = Workbook {
            sheets: vec![Sheet::no_data("Result")],
        };

        let artifact = pipeline.load(workbook).await.unwrap();

        assert!(artifact.file_name.starts_with("posttest_results_"));
        assert!(artifact.file_name.ends_with(".zip"));
        assert_eq!("posttest_results_20250101_000000.zip".len(), artifact.file_name.len());
        assert_eq!(artifact.location, format!("memory://{}", artifact.file_name));
        assert_eq!(artifact.content_type, "application/zip");
        assert_eq!(artifact.sheets.len(), 1);
        assert_eq!(
            storage.get_file(&artifact.file_name).await,
            Some(artifact.bytes.clone())
        );
    }

    #[test]
    fn test_prepare_queries_keeps_unresolved_markers() {
        let mut queries = QuerySet::new();
        queries.insert("Query1", "select &test_start_time, &test_end_time");
        let window = TimeWindow::resolve(
            &TimeOptions {
                start: Some("2025-01-01 00:00".to_string()),
                ..TimeOptions::default()
            },
            None,
        )
        .unwrap();

        let blocks = prepare_queries(queries, &window, PlaceholderStyle::Raw);
        assert_eq!(blocks[0].sql, "select 2025-01-01 00:00:00, &test_end_time");
    }

    #[tokio::test]
    async fn test_dry_run_blocks_substitutes_without_a_database() {
        let config = MockConfig {
            time: TimeOptions {
                start: Some("2025-01-15 10:00:00".to_string()),
                end: Some("2025-01-15 12:00:00".to_string()),
                input_timezone: Some("Asia/Kolkata".to_string()),
                target_timezone: Some("US/Central".to_string()),
                placeholder_style: PlaceholderStyle::Quoted,
                ..TimeOptions::default()
            },
            ..MockConfig::default()
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"-- Query1\nselect * from t where ts >= &test_start_time;\n\
              -- Query2\nselect * from t where ts < &test_end_time;\n",
        )
        .unwrap();

        let blocks = dry_run_blocks(&config, &QuerySource::File(file.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "Query1");
        assert_eq!(blocks[0].sql, "select * from t where ts >= '2025-01-14 22:30:00'");
        assert_eq!(blocks[1].sql, "select * from t where ts < '2025-01-15 00:30:00'");
    }

    #[tokio::test]
    async fn test_dry_run_blocks_leaves_markers_for_database_target() {
        let config = MockConfig {
            time: TimeOptions {
                start: Some("2025-01-15 10:00:00".to_string()),
                input_timezone: Some("UTC".to_string()),
                target_timezone: Some("database".to_string()),
                ..TimeOptions::default()
            },
            ..MockConfig::default()
        };
        let sql = "select * from t where ts >= &test_start_time";

        let blocks = dry_run_blocks(&config, &QuerySource::Inline(sql.to_string()))
            .await
            .unwrap();

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sql, sql);
    }

    #[tokio::test]
    async fn test_dry_run_blocks_rejects_empty_source() {
        let err = dry_run_blocks(&MockConfig::default(), &QuerySource::Inline("  ".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::NoQueriesError { .. }));
    }
}
