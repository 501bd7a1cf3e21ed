use crate::domain::model::{
    ErrorPolicy, ExportArtifact, OutputFormat, ParseMode, QuerySet, ResultSet, SessionInfo,
    TimeOptions, Workbook,
};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// 給使用者看的完整位置
    fn location(&self, path: &str) -> String;
}

/// 已連線的資料庫：執行字串、回傳資料列
#[async_trait]
pub trait Database: Send + Sync {
    fn backend(&self) -> &'static str;
    async fn session_info(&self) -> Result<SessionInfo>;
    async fn set_session_timezone(&self, zone: &str) -> Result<()>;
    async fn fetch(&self, sql: &str) -> Result<ResultSet>;
}

pub trait WorkbookWriter: Send + Sync {
    fn format(&self) -> OutputFormat;
    fn render(&self, workbook: &Workbook) -> Result<Vec<u8>>;
}

/// 回傳實際成功送出的 relay
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, artifact: &ExportArtifact) -> Result<String>;
}

pub trait ConfigProvider: Send + Sync {
    fn output_path(&self) -> &str;
    fn output_format(&self) -> OutputFormat;
    fn file_prefix(&self) -> &str;
    fn parse_mode(&self) -> ParseMode;
    fn error_policy(&self) -> ErrorPolicy;
    fn time_options(&self) -> &TimeOptions;
    fn session_timezone(&self) -> Option<&str>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<QuerySet>;
    async fn transform(&self, queries: QuerySet) -> Result<Workbook>;
    async fn load(&self, workbook: Workbook) -> Result<ExportArtifact>;
}
