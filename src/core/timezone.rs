use crate::domain::model::{TimeOptions, DEFAULT_TARGET_TIMEZONE};
use crate::utils::error::{ReportError, Result};
use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 代表「使用資料庫 session 回報的時區」
pub const DATABASE_TARGET: &str = "database";

const INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

static OFFSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-]?)(\d{2}):?(\d{2})$").expect("offset regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Zone {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ReportError::TimezoneError {
                value: value.to_string(),
                reason: "timezone is empty".to_string(),
            });
        }

        if ["UTC", "GMT", "Z"]
            .iter()
            .any(|alias| trimmed.eq_ignore_ascii_case(alias))
        {
            return Ok(Zone::Named(Tz::UTC));
        }

        if let Some(caps) = OFFSET.captures(trimmed) {
            return parse_offset(trimmed, &caps[1], &caps[2], &caps[3]);
        }

        trimmed
            .parse::<Tz>()
            .map(Zone::Named)
            .map_err(|_| ReportError::TimezoneError {
                value: value.to_string(),
                reason: "not an IANA timezone name or ±HH:MM offset".to_string(),
            })
    }

    pub fn name(&self) -> String {
        match self {
            Zone::Named(tz) => tz.name().to_string(),
            Zone::Fixed(offset) => offset.to_string(),
        }
    }

    /// 把牆上時間解讀為此時區的時間。
    /// 夏令時間結束的重複時段取標準時間（較晚的那一刻）；
    /// 夏令時間開始的空白時段視為錯誤。
    pub fn localize(&self, naive: NaiveDateTime) -> Result<DateTime<Utc>> {
        match self {
            Zone::Named(tz) => pick_instant(tz.from_local_datetime(&naive), naive, self),
            Zone::Fixed(offset) => pick_instant(offset.from_local_datetime(&naive), naive, self),
        }
    }

    pub fn format_instant(&self, instant: DateTime<Utc>) -> String {
        match self {
            Zone::Named(tz) => instant.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string(),
            Zone::Fixed(offset) => instant
                .with_timezone(offset)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
        }
    }
}

impl FromStr for Zone {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        Zone::parse(s)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn parse_offset(raw: &str, sign: &str, hours: &str, minutes: &str) -> Result<Zone> {
    let invalid = |reason: &str| ReportError::TimezoneError {
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let hours: i32 = hours.parse().map_err(|_| invalid("invalid hours"))?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid("invalid minutes"))?;
    if hours > 23 || minutes > 59 {
        return Err(invalid("offset out of range"));
    }

    let seconds = (hours * 3600 + minutes * 60) * if sign == "-" { -1 } else { 1 };
    FixedOffset::east_opt(seconds)
        .map(Zone::Fixed)
        .ok_or_else(|| invalid("offset out of range"))
}

fn pick_instant<T: TimeZone>(
    result: LocalResult<DateTime<T>>,
    naive: NaiveDateTime,
    zone: &Zone,
) -> Result<DateTime<Utc>> {
    match result {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(_, standard) => {
            tracing::debug!(
                "{} is ambiguous in {}, using standard time",
                naive.format(TIMESTAMP_FORMAT),
                zone
            );
            Ok(standard.with_timezone(&Utc))
        }
        LocalResult::None => Err(ReportError::TimestampError {
            value: naive.format(TIMESTAMP_FORMAT).to_string(),
            reason: format!("this local time does not exist in {} (DST gap)", zone),
        }),
    }
}

/// 空白代表沒有輸入
pub fn parse_timestamp(value: &str) -> Result<Option<NaiveDateTime>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(Some)
        .ok_or_else(|| ReportError::TimestampError {
            value: value.to_string(),
            reason: "expected YYYY-MM-DD HH:MM:SS".to_string(),
        })
}

pub fn convert(naive: NaiveDateTime, from: &Zone, to: &Zone) -> Result<String> {
    let instant = from.localize(naive)?;
    Ok(to.format_instant(instant))
}

/// 把常見的資料庫時區偏移換成易讀的名稱
pub fn readable_offset(tz: &str) -> String {
    match tz.trim() {
        "+05:30" => "Indian Standard Time (IST)".to_string(),
        "-04:00" => "Eastern Time (ET)".to_string(),
        "-05:00" => "Central Time (CST)".to_string(),
        "+00:00" | "00:00" => "Greenwich Mean Time (GMT)".to_string(),
        "+01:00" => "Central European Time (CET)".to_string(),
        "" => "Unknown Time Zone".to_string(),
        other => other.to_string(),
    }
}

pub fn zones() -> impl Iterator<Item = &'static str> {
    chrono_tz::TZ_VARIANTS.iter().map(|tz| tz.name())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedTime {
    pub input: String,
    pub value: String,
    pub display: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<ConvertedTime>,
    pub end: Option<ConvertedTime>,
    pub input_zone: Option<String>,
    pub target_zone: Option<String>,
}

impl TimeWindow {
    pub fn start_value(&self) -> Option<&str> {
        self.start.as_ref().map(|t| t.value.as_str())
    }

    pub fn end_value(&self) -> Option<&str> {
        self.end.as_ref().map(|t| t.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// 沒設定任何時區時只做格式正規化；
    /// 否則輸入時區預設 UTC、目標時區預設 US/Central。
    pub fn resolve(options: &TimeOptions, database_zone: Option<&Zone>) -> Result<Self> {
        let start = parse_timestamp(options.start.as_deref().unwrap_or(""))?;
        let end = parse_timestamp(options.end.as_deref().unwrap_or(""))?;

        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                tracing::warn!(
                    "⚠️ End time {} is before start time {}",
                    e.format(TIMESTAMP_FORMAT),
                    s.format(TIMESTAMP_FORMAT)
                );
            }
        }

        if !options.converts() {
            let plain = |naive: Option<NaiveDateTime>| {
                naive.map(|n| {
                    let text = n.format(TIMESTAMP_FORMAT).to_string();
                    ConvertedTime {
                        input: text.clone(),
                        value: text,
                        display: Vec::new(),
                    }
                })
            };
            return Ok(Self {
                start: plain(start),
                end: plain(end),
                input_zone: None,
                target_zone: None,
            });
        }

        let input = Zone::parse(options.input_timezone.as_deref().unwrap_or("UTC"))?;
        let target = resolve_target(options.target_timezone.as_deref(), database_zone)?;
        let displays = options
            .display_timezones
            .iter()
            .map(|z| Zone::parse(z))
            .collect::<Result<Vec<_>>>()?;

        let convert_one = |naive: Option<NaiveDateTime>| -> Result<Option<ConvertedTime>> {
            let Some(naive) = naive else {
                return Ok(None);
            };
            let instant = input.localize(naive)?;
            Ok(Some(ConvertedTime {
                input: naive.format(TIMESTAMP_FORMAT).to_string(),
                value: target.format_instant(instant),
                display: displays
                    .iter()
                    .map(|z| (z.name(), z.format_instant(instant)))
                    .collect(),
            }))
        };

        Ok(Self {
            start: convert_one(start)?,
            end: convert_one(end)?,
            input_zone: Some(input.name()),
            target_zone: Some(target.name()),
        })
    }
}

pub fn targets_database(options: &TimeOptions) -> bool {
    options
        .target_timezone
        .as_deref()
        .map(|t| t.trim().eq_ignore_ascii_case(DATABASE_TARGET))
        .unwrap_or(false)
}

fn resolve_target(target: Option<&str>, database_zone: Option<&Zone>) -> Result<Zone> {
    match target.map(str::trim) {
        None | Some("") => Zone::parse(DEFAULT_TARGET_TIMEZONE),
        Some(t) if t.eq_ignore_ascii_case(DATABASE_TARGET) => {
            database_zone.copied().ok_or_else(|| ReportError::ConfigError {
                message: "target timezone 'database' needs a database that reports its timezone"
                    .to_string(),
            })
        }
        Some(t) => Zone::parse(t),
    }
}
