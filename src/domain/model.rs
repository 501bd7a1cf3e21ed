use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryBlock {
    pub name: String,
    pub sql: String,
}

/// 依名稱索引、保留插入順序的查詢集合。
/// 重複的名稱會原地覆蓋先前的 SQL。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuerySet {
    blocks: Vec<QueryBlock>,
}

impl QuerySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, sql: impl Into<String>) {
        let name = name.into();
        let sql = sql.into();
        match self.blocks.iter_mut().find(|b| b.name == name) {
            Some(existing) => existing.sql = sql,
            None => self.blocks.push(QueryBlock { name, sql }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.blocks
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.sql.as_str())
    }

    pub fn names(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryBlock> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl IntoIterator for QuerySet {
    type Item = QueryBlock;
    type IntoIter = std::vec::IntoIter<QueryBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

impl<'a> IntoIterator for &'a QuerySet {
    type Item = &'a QueryBlock;
    type IntoIter = std::slice::Iter<'a, QueryBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

/// 查詢來源：上傳的文字檔或命令列直接輸入的單一語句
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    File(PathBuf),
    Inline(String),
}

impl fmt::Display for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuerySource::File(path) => write!(f, "file {}", path.display()),
            QuerySource::Inline(_) => write!(f, "the inline query"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ResultSet {
    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetKind {
    Result,
    Empty,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub name: String,
    pub kind: SheetKind,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    /// 沒有欄位（DDL/DML）時改成 "No Data" 工作表
    pub fn from_result(name: impl Into<String>, result: ResultSet) -> Self {
        if !result.has_columns() {
            return Self::no_data(name);
        }
        Self {
            name: name.into(),
            kind: SheetKind::Result,
            columns: result.columns,
            rows: result.rows,
        }
    }

    pub fn no_data(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SheetKind::Empty,
            columns: vec!["Result".to_string()],
            rows: vec![vec![Cell::from("No Data")]],
        }
    }

    pub fn error(name: impl Into<String>, message: &str, sql: &str) -> Self {
        Self {
            name: name.into(),
            kind: SheetKind::Error,
            columns: vec!["Error".to_string(), "SQL".to_string()],
            rows: vec![vec![Cell::from(message), Cell::from(sql)]],
        }
    }

    pub fn summary(&self) -> SheetSummary {
        SheetSummary {
            name: self.name.clone(),
            kind: self.kind,
            rows: match self.kind {
                SheetKind::Result => self.rows.len(),
                _ => 0,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn error_count(&self) -> usize {
        self.sheets
            .iter()
            .filter(|s| s.kind == SheetKind::Error)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetSummary {
    pub name: String,
    pub kind: SheetKind,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub location: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
    pub sheets: Vec<SheetSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Skipped,
    Sent { relay: String },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub file_name: String,
    pub location: String,
    pub sheets: Vec<SheetSummary>,
    pub delivery: DeliveryStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub backend: String,
    pub database_timezone: Option<String>,
    pub session_timezone: Option<String>,
    pub current_time: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum ParseMode {
    #[default]
    Auto,
    Blocks,
    Statements,
    Lines,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum PlaceholderStyle {
    #[default]
    Raw,
    Quoted,
    ToTimestamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    #[default]
    Sheet,
    Abort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Xlsx,
    CsvZip,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::CsvZip => "zip",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            OutputFormat::CsvZip => "application/zip",
        }
    }
}

pub const DEFAULT_TARGET_TIMEZONE: &str = "US/Central";
pub const DEFAULT_DISPLAY_TIMEZONES: &[&str] = &["US/Central", "US/Eastern"];

/// 時間區間與時區轉換設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeOptions {
    pub start: Option<String>,
    pub end: Option<String>,
    pub input_timezone: Option<String>,
    /// 目標時區；"database" 代表使用資料庫回報的時區
    pub target_timezone: Option<String>,
    pub display_timezones: Vec<String>,
    pub placeholder_style: PlaceholderStyle,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            input_timezone: None,
            target_timezone: None,
            display_timezones: DEFAULT_DISPLAY_TIMEZONES
                .iter()
                .map(|z| z.to_string())
                .collect(),
            placeholder_style: PlaceholderStyle::Raw,
        }
    }
}

impl TimeOptions {
    pub fn converts(&self) -> bool {
        self.input_timezone.is_some() || self.target_timezone.is_some()
    }
}
