use crate::core::timezone::Zone;
use crate::domain::model::{Cell, ResultSet, SessionInfo};
use crate::domain::ports::Database;
use crate::utils::error::{ReportError, Result};
use crate::utils::validation::redact_url;
use async_trait::async_trait;
use chrono_tz::Tz;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::types::Decimal;
use sqlx::{Column, Connection, Executor, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use tokio::sync::Mutex;

enum Handle {
    Sqlite(SqliteConnection),
    Postgres(PgConnection),
}

/// 單一連線；沒有連線池、沒有交易管理
pub struct SqlxDatabase {
    handle: Mutex<Handle>,
    backend: &'static str,
}

impl SqlxDatabase {
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::debug!("Connecting to {}", redact_url(url));

        if url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(url)?;
            let conn = SqliteConnection::connect_with(&options).await?;
            return Ok(Self {
                handle: Mutex::new(Handle::Sqlite(conn)),
                backend: "sqlite",
            });
        }

        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            let options = PgConnectOptions::from_str(url)?;
            let conn = PgConnection::connect_with(&options).await?;
            return Ok(Self {
                handle: Mutex::new(Handle::Postgres(conn)),
                backend: "postgres",
            });
        }

        Err(ReportError::InvalidConfigValueError {
            field: "database.url".to_string(),
            value: redact_url(url),
            reason: "Only sqlite: and postgres:// URLs are supported".to_string(),
        })
    }

    pub async fn close(self) -> Result<()> {
        match self.handle.into_inner() {
            Handle::Sqlite(conn) => conn.close().await?,
            Handle::Postgres(conn) => conn.close().await?,
        }
        Ok(())
    }
}

#[async_trait]
impl Database for SqlxDatabase {
    fn backend(&self) -> &'static str {
        self.backend
    }

    async fn session_info(&self) -> Result<SessionInfo> {
        let mut guard = self.handle.lock().await;
        match &mut *guard {
            Handle::Sqlite(conn) => {
                let row = sqlx::query("SELECT CURRENT_TIMESTAMP")
                    .fetch_one(&mut *conn)
                    .await?;
                // SQLite 的 CURRENT_TIMESTAMP 一律是 UTC
                Ok(SessionInfo {
                    backend: self.backend.to_string(),
                    database_timezone: Some("+00:00".to_string()),
                    session_timezone: Some("+00:00".to_string()),
                    current_time: row.try_get_unchecked::<Option<String>, _>(0)?,
                })
            }
            Handle::Postgres(conn) => {
                let row = sqlx::query(
                    "SELECT (SELECT reset_val FROM pg_settings WHERE name = 'TimeZone'), \
                     current_setting('TimeZone'), CAST(now() AS TEXT)",
                )
                .persistent(false)
                .fetch_one(&mut *conn)
                .await?;
                Ok(SessionInfo {
                    backend: self.backend.to_string(),
                    database_timezone: row.try_get::<Option<String>, _>(0)?,
                    session_timezone: row.try_get::<Option<String>, _>(1)?,
                    current_time: row.try_get::<Option<String>, _>(2)?,
                })
            }
        }
    }

    async fn set_session_timezone(&self, zone: &str) -> Result<()> {
        let mut guard = self.handle.lock().await;
        match &mut *guard {
            Handle::Sqlite(_) => {
                tracing::warn!("⚠️ SQLite has no session timezone, ignoring {}", zone);
                Ok(())
            }
            Handle::Postgres(conn) => {
                let escaped = zone.replace('\'', "''");
                // 固定偏移要用 INTERVAL，否則 PostgreSQL 會當成 POSIX 格式（正負號相反）
                let statement = if zone.starts_with('+') || zone.starts_with('-') {
                    format!("SET TIME ZONE INTERVAL '{}' HOUR TO MINUTE", escaped)
                } else {
                    format!("SET TIME ZONE '{}'", escaped)
                };
                sqlx::query(&statement)
                    .persistent(false)
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            }
        }
    }

    async fn fetch(&self, sql: &str) -> Result<ResultSet> {
        let mut guard = self.handle.lock().await;
        match &mut *guard {
            Handle::Sqlite(conn) => {
                let rows = sqlx::query(sql)
                    .persistent(false)
                    .fetch_all(&mut *conn)
                    .await?;
                let columns = match rows.first() {
                    Some(row) => column_names(row),
                    None => match (&mut *conn).describe(sql).await {
                        Ok(described) => names(described.columns()),
                        Err(e) => column_less(e),
                    },
                };
                let rows = rows
                    .iter()
                    .map(|row| (0..row.len()).map(|idx| sqlite_cell(row, idx)).collect())
                    .collect();
                Ok(ResultSet { columns, rows })
            }
            Handle::Postgres(conn) => {
                let rows = sqlx::query(sql)
                    .persistent(false)
                    .fetch_all(&mut *conn)
                    .await?;
                let columns = match rows.first() {
                    Some(row) => column_names(row),
                    None => match (&mut *conn).describe(sql).await {
                        Ok(described) => names(described.columns()),
                        Err(e) => column_less(e),
                    },
                };
                let zone = if rows.first().is_some_and(has_timestamptz) {
                    session_zone(conn).await
                } else {
                    Zone::Named(Tz::UTC)
                };
                let rows = rows
                    .iter()
                    .map(|row| (0..row.len()).map(|idx| postgres_cell(row, idx, &zone)).collect())
                    .collect();
                Ok(ResultSet { columns, rows })
            }
        }
    }
}

fn column_names<R: Row>(row: &R) -> Vec<String> {
    names(row.columns())
}

fn names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

/// 結果為空時仍要保留標題列；DDL/DML 或 describe 失敗則沒有欄位
fn column_less(e: sqlx::Error) -> Vec<String> {
    tracing::debug!("describe failed, treating statement as column-less: {}", e);
    Vec::new()
}

// SQLite 是動態型別，依實際值的儲存型別解碼
fn sqlite_cell(row: &SqliteRow, idx: usize) -> Cell {
    let storage_type = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Cell::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Cell::Null,
    };

    match storage_type.as_str() {
        "INTEGER" => row
            .try_get_unchecked::<i64, _>(idx)
            .map(Cell::Int)
            .unwrap_or(Cell::Null),
        "REAL" => row
            .try_get_unchecked::<f64, _>(idx)
            .map(Cell::Float)
            .unwrap_or(Cell::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|bytes| Cell::Text(format!("<{} bytes>", bytes.len())))
            .unwrap_or(Cell::Null),
        _ => row
            .try_get_unchecked::<String, _>(idx)
            .map(Cell::Text)
            .unwrap_or(Cell::Null),
    }
}

fn has_timestamptz(row: &PgRow) -> bool {
    row.columns()
        .iter()
        .any(|c| c.type_info().name() == "TIMESTAMPTZ")
}

/// TIMESTAMPTZ 以目前 session 的時區顯示；讀不到或無法解析時用 UTC
async fn session_zone(conn: &mut PgConnection) -> Zone {
    let setting = sqlx::query("SELECT current_setting('TimeZone')")
        .persistent(false)
        .fetch_one(&mut *conn)
        .await
        .and_then(|row| row.try_get::<String, _>(0));

    match setting {
        Ok(name) => Zone::parse(&name).unwrap_or_else(|_| {
            tracing::debug!("session timezone {} not understood, showing UTC", name);
            Zone::Named(Tz::UTC)
        }),
        Err(e) => {
            tracing::debug!("could not read session timezone, showing UTC: {}", e);
            Zone::Named(Tz::UTC)
        }
    }
}

fn timestamptz_text(instant: DateTime<Utc>, zone: &Zone) -> String {
    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";
    match zone {
        Zone::Named(tz) => instant.with_timezone(tz).format(FORMAT).to_string(),
        Zone::Fixed(offset) => instant.with_timezone(offset).format(FORMAT).to_string(),
    }
}

// f64 放不下的精度改寫成文字
fn numeric_cell(value: Decimal) -> Cell {
    let exact = value.normalize().to_string();
    match exact.parse::<f64>() {
        Ok(v) if v.to_string() == exact => Cell::Float(v),
        _ => Cell::Text(value.to_string()),
    }
}

fn postgres_cell(row: &PgRow, idx: usize, zone: &Zone) -> Cell {
    use sqlx::types::chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    let type_name = row.column(idx).type_info().name().to_string();
    let cell = match type_name.as_str() {
        "BOOL" => row.try_get::<Option<bool>, _>(idx).map(|v| v.map(Cell::Bool)),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map(|v| v.map(|n| Cell::Int(i64::from(n)))),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map(|v| v.map(|n| Cell::Int(i64::from(n)))),
        "INT8" => row.try_get::<Option<i64>, _>(idx).map(|v| v.map(Cell::Int)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map(|v| v.map(|n| Cell::Float(f64::from(n)))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx).map(|v| v.map(Cell::Float)),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(idx)
            .map(|v| v.map(numeric_cell)),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .map(|v| v.map(|d| Cell::Text(d.format("%Y-%m-%d").to_string()))),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)
            .map(|v| v.map(|t| Cell::Text(t.format("%H:%M:%S").to_string()))),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .map(|v| v.map(|t| Cell::Text(t.format("%Y-%m-%d %H:%M:%S").to_string()))),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .map(|v| v.map(|t| Cell::Text(timestamptz_text(t, zone)))),
        _ => row.try_get::<Option<String>, _>(idx).map(|v| v.map(Cell::Text)),
    };

    match cell {
        Ok(Some(cell)) => cell,
        Ok(None) => Cell::Null,
        Err(_) => Cell::Text(format!("<unsupported {}>", type_name)),
    }
}
