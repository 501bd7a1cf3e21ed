use crate::utils::error::{ReportError, Result};
use crate::utils::validation::{redact_url, validate_database_url};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// 完整 URL，或 host/port/service/user/password 分開填寫
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionDetails {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub service: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ConnectionDetails {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// 右邊有值的欄位覆蓋左邊
    pub fn merge(self, overrides: ConnectionDetails) -> Self {
        // 兩邊寫法不同時，以覆蓋的那一邊為準
        if overrides.url.is_some() {
            return overrides;
        }
        if overrides.host.is_some() {
            return Self {
                url: None,
                host: overrides.host,
                port: overrides.port.or(self.port),
                service: overrides.service.or(self.service),
                user: overrides.user.or(self.user),
                password: overrides.password.or(self.password),
            };
        }
        Self {
            url: self.url,
            host: self.host,
            port: overrides.port.or(self.port),
            service: overrides.service.or(self.service),
            user: overrides.user.or(self.user),
            password: overrides.password.or(self.password),
        }
    }

    pub fn to_url(&self) -> Result<String> {
        if let Some(url) = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            validate_database_url("database.url", url)?;
            return Ok(url.to_string());
        }

        let host = self
            .host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ReportError::MissingConfigError {
                field: "database.url or database.host".to_string(),
            })?;
        let service = self
            .service
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ReportError::MissingConfigError {
                field: "database.service".to_string(),
            })?;

        let invalid = |field: &str, value: &str, reason: &str| ReportError::InvalidConfigValueError {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let mut url = Url::parse("postgres://localhost")
            .map_err(|e| invalid("database.host", host, &e.to_string()))?;
        url.set_host(Some(host.trim()))
            .map_err(|e| invalid("database.host", host, &e.to_string()))?;
        url.set_port(Some(self.port.unwrap_or(DEFAULT_POSTGRES_PORT)))
            .map_err(|_| invalid("database.port", host, "port cannot be set for this host"))?;
        if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(user)
                .map_err(|_| invalid("database.user", user, "user cannot be set for this host"))?;
            if let Some(password) = self.password.as_deref() {
                url.set_password(Some(password))
                    .map_err(|_| invalid("database.password", "****", "password cannot be set"))?;
            }
        }
        url.set_path(&format!("/{}", service.trim()));

        Ok(url.to_string())
    }

    /// 給日誌與畫面用，不含密碼
    pub fn display(&self) -> String {
        match self.to_url() {
            Ok(url) => redact_url(&url),
            Err(_) => match (&self.url, &self.host) {
                (Some(url), _) => redact_url(url),
                (None, Some(host)) => host.clone(),
                (None, None) => "<not configured>".to_string(),
            },
        }
    }
}
