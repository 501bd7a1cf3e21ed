use crate::utils::error::{ReportError, Result};
use std::collections::HashSet;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub const SUPPORTED_DATABASE_SCHEMES: &[&str] = &["sqlite", "postgres", "postgresql"];

pub fn validate_database_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.trim().is_empty() {
        return Err(ReportError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: String::new(),
            reason: "Database URL cannot be empty".to_string(),
        });
    }

    // sqlite::memory: / sqlite:data.db 不是標準 URL，只檢查前綴
    if url_str.starts_with("sqlite:") {
        return Ok(());
    }

    match Url::parse(url_str) {
        Ok(url) => {
            if SUPPORTED_DATABASE_SCHEMES.contains(&url.scheme()) {
                Ok(())
            } else {
                Err(ReportError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: redact_url(url_str),
                    reason: format!(
                        "Unsupported database scheme: {}. Supported: {}",
                        url.scheme(),
                        SUPPORTED_DATABASE_SCHEMES.join(", ")
                    ),
                })
            }
        }
        Err(e) => Err(ReportError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: redact_url(url_str),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

/// 隱藏 URL 中的密碼，避免寫進日誌
pub fn redact_url(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("****")).is_ok() {
                url.to_string()
            } else {
                url_str.to_string()
            }
        }
        _ => url_str.to_string(),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ReportError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(ReportError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_file_extension(field_name: &str, file: &str, allowed_extensions: &[&str]) -> Result<()> {
    let allowed_set: HashSet<&str> = allowed_extensions.iter().copied().collect();

    match std::path::Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(extension) if allowed_set.contains(extension.to_ascii_lowercase().as_str()) => Ok(()),
        Some(extension) => Err(ReportError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: file.to_string(),
            reason: format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                extension,
                allowed_extensions.join(", ")
            ),
        }),
        None => Err(ReportError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: file.to_string(),
            reason: "File has no extension or invalid filename".to_string(),
        }),
    }
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ReportError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_email_address(field_name: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !trimmed.contains(' ')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ReportError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Not a valid email address".to_string(),
        })
    }
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(ReportError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_database_url() {
        assert!(validate_database_url("database.url", "sqlite::memory:").is_ok());
        assert!(validate_database_url("database.url", "sqlite://reports.db").is_ok());
        assert!(validate_database_url("database.url", "postgres://u:p@db:5432/app").is_ok());
        assert!(validate_database_url("database.url", "").is_err());
        assert!(validate_database_url("database.url", "mysql://db/app").is_err());
        assert!(validate_database_url("database.url", "not a url").is_err());
    }

    #[test]
    fn test_redact_url_hides_password() {
        let redacted = redact_url("postgres://scott:tiger@db:5432/app");
        assert!(!redacted.contains("tiger"));
        assert!(redacted.contains("scott"));
        assert_eq!(redact_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension("query_file", "post_test.txt", &["txt", "sql"]).is_ok());
        assert!(validate_file_extension("query_file", "POST_TEST.SQL", &["txt", "sql"]).is_ok());
        assert!(validate_file_extension("query_file", "data.csv", &["txt", "sql"]).is_err());
        assert!(validate_file_extension("query_file", "noext", &["txt", "sql"]).is_err());
    }

    #[test]
    fn test_validate_email_address() {
        assert!(validate_email_address("email.sender", "ops@example.com").is_ok());
        assert!(validate_email_address("email.sender", "ops.example.com").is_err());
        assert!(validate_email_address("email.sender", "a@b@c").is_err());
        assert!(validate_email_address("email.sender", "@example.com").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("email.timeout_seconds", 10, 1, 300).is_ok());
        assert!(validate_range("email.timeout_seconds", 0, 1, 300).is_err());
    }
}
