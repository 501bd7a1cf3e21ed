use async_trait::async_trait;
use query_report::domain::model::{
    DeliveryStatus, ErrorPolicy, ExportArtifact, OutputFormat, PlaceholderStyle, QuerySource,
    SheetKind,
};
use query_report::domain::ports::{Database, Notifier};
use query_report::utils::error::{ReportError, Result};
use query_report::{ExportEngine, LocalStorage, QueryPipeline, RunSettings, SqlxDatabase};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

async fn seeded_database() -> SqlxDatabase {
    let db = SqlxDatabase::connect("sqlite::memory:").await.unwrap();
    db.fetch("CREATE TABLE events (id INTEGER, ts TEXT, status TEXT)")
        .await
        .unwrap();
    db.fetch(
        "INSERT INTO events VALUES \
         (1, '2025-01-14 22:00:00', 'OK'), \
         (2, '2025-01-14 23:00:00', 'FAILED'), \
         (3, '2025-01-15 00:15:00', 'OK'), \
         (4, '2025-01-15 01:00:00', 'OK')",
    )
    .await
    .unwrap();
    db
}

fn write_queries(dir: &TempDir, text: &str) -> QuerySource {
    let path = dir.path().join("queries.sql");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
    QuerySource::File(path)
}

fn settings(output: &Path, format: OutputFormat) -> RunSettings {
    let mut settings = RunSettings::default();
    settings.output_path = output.display().to_string();
    settings.output_format = format;
    settings
}

fn read_entry(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    let mut content = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    content
}

#[tokio::test]
async fn test_csv_zip_export_with_failures_and_ddl() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out");
    let source = write_queries(
        &dir,
        "-- Query1 all events\nselect id, status from events order by id;\n\n\
         -- Query2\nselect * from missing_table;\n\n\
         -- Query3\ncreate table scratch (id integer);\n",
    );

    let pipeline = QueryPipeline::new(
        LocalStorage::new(output.display().to_string()),
        seeded_database().await,
        settings(&output, OutputFormat::CsvZip),
        source,
    );
    let summary = ExportEngine::new(pipeline).run().await.unwrap();

    assert!(summary.file_name.starts_with("posttest_results_"));
    assert!(summary.file_name.ends_with(".zip"));
    assert_eq!(summary.delivery, DeliveryStatus::Skipped);

    let kinds: Vec<_> = summary
        .sheets
        .iter()
        .map(|s| (s.name.as_str(), s.kind, s.rows))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("Query1", SheetKind::Result, 4),
            ("Query2_error", SheetKind::Error, 0),
            ("Query3", SheetKind::Empty, 0),
        ]
    );

    let bytes = std::fs::read(output.join(&summary.file_name)).unwrap();
    assert_eq!(
        read_entry(&bytes, "Query1.csv"),
        "id,status\n1,OK\n2,FAILED\n3,OK\n4,OK\n"
    );
    let error_sheet = read_entry(&bytes, "Query2_error.csv");
    assert!(error_sheet.starts_with("Error,SQL\n"));
    assert!(error_sheet.contains("no such table"));
    assert!(error_sheet.contains("select * from missing_table"));
    assert_eq!(read_entry(&bytes, "Query3.csv"), "Result\nNo Data\n");
}

#[tokio::test]
async fn test_converted_window_is_substituted_before_execution() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path(), OutputFormat::CsvZip);
    settings.time.start = Some("2025-01-15 10:00:00".to_string());
    settings.time.end = Some("2025-01-15 12:00:00".to_string());
    settings.time.input_timezone = Some("Asia/Kolkata".to_string());
    settings.time.placeholder_style = PlaceholderStyle::Quoted;

    // IST 10:00-12:00 → US/Central 2025-01-14 22:30:00 - 2025-01-15 00:30:00
    let source = QuerySource::Inline(
        "select count(*) as hits from events where ts between &test_start_time and &test_end_time;"
            .to_string(),
    );
    let pipeline = QueryPipeline::new(
        LocalStorage::new(dir.path().display().to_string()),
        seeded_database().await,
        settings,
        source,
    );
    let summary = ExportEngine::new(pipeline).run().await.unwrap();

    assert_eq!(summary.sheets[0].name, "Result");
    let bytes = std::fs::read(dir.path().join(&summary.file_name)).unwrap();
    assert_eq!(read_entry(&bytes, "Result.csv"), "hits\n2\n");
}

#[tokio::test]
async fn test_xlsx_export_contains_every_sheet() {
    let dir = TempDir::new().unwrap();
    let source = write_queries(
        &dir,
        "select status, count(*) as n from events group by status order by status;\n\
         select * from events where 1 = 0;\n",
    );

    let pipeline = QueryPipeline::new(
        LocalStorage::new(dir.path().display().to_string()),
        seeded_database().await,
        settings(dir.path(), OutputFormat::Xlsx),
        source,
    );
    let summary = ExportEngine::new(pipeline).run().await.unwrap();

    assert!(summary.file_name.ends_with(".xlsx"));
    // 空結果仍保留標題列
    assert_eq!(summary.sheets[1].kind, SheetKind::Result);
    assert_eq!(summary.sheets[1].rows, 0);

    let bytes = std::fs::read(dir.path().join(&summary.file_name)).unwrap();
    let workbook_xml = read_entry(&bytes, "xl/workbook.xml");
    assert!(workbook_xml.contains("name=\"Query_1\""));
    assert!(workbook_xml.contains("name=\"Query_2\""));
}

#[tokio::test]
async fn test_abort_policy_fails_the_run_without_writing() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out");
    let mut settings = settings(&output, OutputFormat::CsvZip);
    settings.error_policy = ErrorPolicy::Abort;

    let source = write_queries(&dir, "Query1\nselect * from nope;\nQuery2\nselect 1;\n");
    let pipeline = QueryPipeline::new(
        LocalStorage::new(output.display().to_string()),
        seeded_database().await,
        settings,
        source,
    );
    let err = ExportEngine::new(pipeline).run().await.unwrap_err();

    assert!(matches!(err, ReportError::QueryFailedError { ref name, .. } if name == "Query1"));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_file_without_queries_is_rejected() {
    let dir = TempDir::new().unwrap();
    let source = write_queries(&dir, "-- nothing to run here\n;\n");
    let pipeline = QueryPipeline::new(
        LocalStorage::new(dir.path().display().to_string()),
        seeded_database().await,
        settings(dir.path(), OutputFormat::Xlsx),
        source,
    );

    let err = ExportEngine::new(pipeline).run().await.unwrap_err();
    assert!(matches!(err, ReportError::NoQueriesError { .. }));
}

struct RecordingNotifier {
    delivered: Arc<Mutex<Vec<(String, String, usize)>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, artifact: &ExportArtifact) -> Result<String> {
        self.delivered.lock().await.push((
            artifact.file_name.clone(),
            artifact.content_type.to_string(),
            artifact.bytes.len(),
        ));
        Ok("relay.test:25".to_string())
    }
}

#[tokio::test]
async fn test_exported_file_is_handed_to_the_notifier() {
    let dir = TempDir::new().unwrap();
    let delivered = Arc::new(Mutex::new(Vec::new()));

    let pipeline = QueryPipeline::new(
        LocalStorage::new(dir.path().display().to_string()),
        seeded_database().await,
        settings(dir.path(), OutputFormat::Xlsx),
        QuerySource::Inline("select id from events".to_string()),
    );
    let engine = ExportEngine::new(pipeline).with_notifier(Box::new(RecordingNotifier {
        delivered: delivered.clone(),
    }));
    let summary = engine.run().await.unwrap();

    assert_eq!(
        summary.delivery,
        DeliveryStatus::Sent {
            relay: "relay.test:25".to_string()
        }
    );
    let delivered = delivered.lock().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, summary.file_name);
    assert_eq!(
        delivered[0].1,
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    let on_disk = std::fs::metadata(dir.path().join(&summary.file_name)).unwrap();
    assert_eq!(delivered[0].2 as u64, on_disk.len());
}
