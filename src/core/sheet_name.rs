use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

pub const MAX_SHEET_NAME_CHARS: usize = 31;

static FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\\/*?:\[\]]").expect("sheet name regex"));

/// Excel 工作表名稱：禁用字元換成 '_'，最多 31 字元
pub fn safe_sheet_name(name: &str) -> String {
    let replaced = FORBIDDEN.replace_all(name, "_");
    let trimmed = replaced.trim().trim_matches('\'');
    let truncated: String = trimmed.chars().take(MAX_SHEET_NAME_CHARS).collect();
    let truncated = truncated.trim_end_matches('\'').trim_end();

    if truncated.is_empty() {
        "Sheet".to_string()
    } else if truncated.eq_ignore_ascii_case("history") {
        // Excel 保留名稱
        format!("{}_", truncated)
    } else {
        truncated.to_string()
    }
}

/// 同一個活頁簿內的名稱不可重複（不分大小寫）
#[derive(Debug, Default)]
pub struct SheetNamer {
    used: HashSet<String>,
}

impl SheetNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, name: &str) -> String {
        let base = safe_sheet_name(name);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }

        let mut n = 2;
        loop {
            let suffix = format!("_{}", n);
            let keep = MAX_SHEET_NAME_CHARS - suffix.chars().count();
            let head: String = base.chars().take(keep).collect();
            let candidate = format!("{}{}", head, suffix);
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}
