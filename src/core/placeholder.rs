use crate::core::timezone::TimeWindow;
use crate::domain::model::PlaceholderStyle;
use regex::{NoExpand, Regex};
use std::sync::LazyLock;

pub const START_PLACEHOLDER: &str = "&test_start_time";
pub const END_PLACEHOLDER: &str = "&test_end_time";

static START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&test_start_time").expect("start placeholder regex"));
static END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&test_end_time").expect("end placeholder regex"));
static ANY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&test_(?:start|end)_time").expect("placeholder regex")
});

pub fn render(value: &str, style: PlaceholderStyle) -> String {
    match style {
        PlaceholderStyle::Raw => value.to_string(),
        PlaceholderStyle::Quoted => format!("'{}'", value.replace('\'', "''")),
        PlaceholderStyle::ToTimestamp => format!(
            "TO_TIMESTAMP('{}', 'YYYY-MM-DD HH24:MI:SS')",
            value.replace('\'', "''")
        ),
    }
}

/// 只替換有值的標記，沒有值的保持原樣
pub fn substitute(
    sql: &str,
    start: Option<&str>,
    end: Option<&str>,
    style: PlaceholderStyle,
) -> String {
    let mut out = sql.to_string();
    if let Some(start) = start.filter(|v| !v.is_empty()) {
        out = START
            .replace_all(&out, NoExpand(&render(start, style)))
            .into_owned();
    }
    if let Some(end) = end.filter(|v| !v.is_empty()) {
        out = END
            .replace_all(&out, NoExpand(&render(end, style)))
            .into_owned();
    }
    out
}

pub fn substitute_window(sql: &str, window: &TimeWindow, style: PlaceholderStyle) -> String {
    substitute(sql, window.start_value(), window.end_value(), style)
}

/// 替換後仍留在 SQL 中的標記（小寫，依出現順序，不重複）
pub fn unresolved_placeholders(sql: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in ANY.find_iter(sql) {
        let marker = m.as_str().to_ascii_lowercase();
        if !found.contains(&marker) {
            found.push(marker);
        }
    }
    found
}
