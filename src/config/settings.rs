use crate::adapters::mail::{MailSettings, DEFAULT_BODY, DEFAULT_SUBJECT, DEFAULT_TIMEOUT_SECONDS};
use crate::config::connection::ConnectionDetails;
use crate::config::toml_config::{EmailConfig, TomlConfig};
use crate::core::timezone::{parse_timestamp, Zone, DATABASE_TARGET};
use crate::core::ConfigProvider;
use crate::domain::model::{ErrorPolicy, OutputFormat, ParseMode, QuerySource, TimeOptions};
use crate::utils::error::{ReportError, Result};
use crate::utils::validation::{
    validate_email_address, validate_file_extension, validate_non_empty_string, validate_path,
    validate_range, Validate,
};
use std::path::PathBuf;
use std::time::Duration;

/// 設定檔與命令列合併後的執行設定
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub database: ConnectionDetails,
    pub session_timezone: Option<String>,
    pub time: TimeOptions,
    pub query_file: Option<PathBuf>,
    pub inline_sql: Option<String>,
    pub parse_mode: ParseMode,
    pub error_policy: ErrorPolicy,
    pub output_path: String,
    pub output_format: OutputFormat,
    pub file_prefix: String,
    pub email: EmailConfig,
    pub monitoring: bool,
}

impl RunSettings {
    pub fn from_config(config: TomlConfig) -> Self {
        let monitoring = config.monitoring_enabled();
        Self {
            database: config.database.connection(),
            session_timezone: config.database.session_timezone,
            time: config.time,
            query_file: config.query.file.map(PathBuf::from),
            inline_sql: config.query.sql,
            parse_mode: config.query.parse_mode,
            error_policy: config.query.on_error,
            output_path: config.output.path,
            output_format: config.output.format,
            file_prefix: config.output.prefix,
            email: config.email,
            monitoring,
        }
    }

    /// 檔案與單一查詢擇一
    pub fn source(&self) -> Result<QuerySource> {
        match (&self.query_file, &self.inline_sql) {
            (Some(_), Some(_)) => Err(ReportError::ConfigValidationError {
                field: "query".to_string(),
                message: "give either a query file or an inline query, not both".to_string(),
            }),
            (Some(file), None) => Ok(QuerySource::File(file.clone())),
            (None, Some(sql)) => Ok(QuerySource::Inline(sql.clone())),
            (None, None) => Err(ReportError::MissingConfigError {
                field: "query.file or query.sql".to_string(),
            }),
        }
    }

    /// 未啟用寄信時回傳 None
    pub fn mail_settings(&self) -> Result<Option<MailSettings>> {
        if !self.email.enabled {
            return Ok(None);
        }

        let sender = self
            .email
            .sender
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ReportError::MissingConfigError {
                field: "email.sender".to_string(),
            })?;
        let recipients: Vec<String> = self
            .email
            .recipients
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();
        if recipients.is_empty() {
            return Err(ReportError::MissingConfigError {
                field: "email.recipients".to_string(),
            });
        }

        let mut settings = MailSettings::new(sender, recipients);
        settings.subject = self
            .email
            .subject
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
        settings.body = self
            .email
            .body
            .clone()
            .unwrap_or_else(|| DEFAULT_BODY.to_string());
        if !self.email.relays.is_empty() {
            settings.relays = self.email.relays.clone();
        }
        settings.timeout =
            Duration::from_secs(self.email.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        Ok(Some(settings))
    }

    fn validate_time(&self) -> Result<()> {
        let time = &self.time;
        if let Some(start) = &time.start {
            parse_timestamp(start)?;
        }
        if let Some(end) = &time.end {
            parse_timestamp(end)?;
        }
        if let Some(input) = &time.input_timezone {
            Zone::parse(input)?;
        }
        if let Some(target) = &time.target_timezone {
            if !target.trim().eq_ignore_ascii_case(DATABASE_TARGET) {
                Zone::parse(target)?;
            }
        }
        for zone in &time.display_timezones {
            Zone::parse(zone)?;
        }
        if let Some(session) = &self.session_timezone {
            Zone::parse(session)?;
        }
        Ok(())
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(TomlConfig::default())
    }
}

impl ConfigProvider for RunSettings {
    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    fn file_prefix(&self) -> &str {
        &self.file_prefix
    }

    fn parse_mode(&self) -> ParseMode {
        self.parse_mode
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

impl Validate for RunSettings {
    fn validate(&self) -> Result<()> {
        validate_path("output.path", &self.output_path)?;
        validate_non_empty_string("output.prefix", &self.file_prefix)?;
        if let QuerySource::File(file) = self.source()? {
            validate_file_extension("query.file", &file.to_string_lossy(), &["sql", "txt"])?;
        }
        self.validate_time()?;

        if let Some(mail) = self.mail_settings()? {
            validate_email_address("email.sender", &mail.sender)?;
            for recipient in &mail.recipients {
                validate_email_address("email.recipients", recipient)?;
            }
            validate_range("email.timeout_seconds", mail.timeout.as_secs(), 1, 300)?;
        }

        Ok(())
    }
}
