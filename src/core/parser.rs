//! Splits uploaded query text into named statements.
//!
//! Three layouts are understood: named blocks introduced by a `Query1` /
//! `-- Query1` line, plain `;`-separated scripts, and one statement per line.

use crate::domain::model::{ParseMode, QuerySet};
use regex::Regex;
use std::sync::LazyLock;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(--[ \t]*)?query(\d+)\b[ \t]*:?").expect("marker regex")
});

/// SQL*Plus 指令，執行前要拿掉（否則 ORA-00933）
const SQLPLUS_COMMANDS: &[&str] = &["SPOOL", "PROMPT", "EXIT", "CONNECT", "REM", "REMARK"];

/// 只有後面接這些設定時，SET 才是 SQL*Plus 指令
const SQLPLUS_SETTINGS: &[&str] = &[
    "LINESIZE", "LINES", "PAGESIZE", "PAGES", "ECHO", "FEEDBACK", "HEADING", "SERVEROUTPUT",
    "TIMING", "TERMOUT", "VERIFY", "TRIMSPOOL", "TRIMOUT", "COLSEP", "DEFINE", "LONG",
    "NUMWIDTH", "WRAP", "TAB", "AUTOTRACE", "SQLBLANKLINES",
];

pub fn has_block_markers(text: &str) -> bool {
    MARKER.is_match(text)
}

pub fn parse_queries(text: &str, mode: ParseMode) -> QuerySet {
    match mode {
        ParseMode::Blocks => parse_blocks(text),
        ParseMode::Statements => name_statements(split_statements(text)),
        ParseMode::Lines => name_statements(split_lines(text)),
        ParseMode::Auto => {
            if has_block_markers(text) {
                tracing::debug!("Query markers found, parsing named blocks");
                parse_blocks(text)
            } else {
                tracing::debug!("No query markers found, splitting on ';'");
                name_statements(split_statements(text))
            }
        }
    }
}

/// 單一查詢模式：整段文字就是一個叫 Result 的區塊
pub fn single_query(sql: &str) -> QuerySet {
    let mut set = QuerySet::new();
    let statement = sanitize_statement(sql);
    if !statement.is_empty() {
        set.insert("Result", statement);
    }
    set
}

pub fn parse_blocks(text: &str) -> QuerySet {
    let mut set = QuerySet::new();
    let markers: Vec<_> = MARKER.captures_iter(text).collect();

    for (i, caps) in markers.iter().enumerate() {
        let Some(whole) = caps.get(0) else {
            continue;
        };

        // "-- Query1 說明文字"：同一行剩下的都是註解
        let body_start = if caps.get(1).is_some() {
            text[whole.end()..]
                .find('\n')
                .map(|offset| whole.end() + offset + 1)
                .unwrap_or(text.len())
        } else {
            whole.end()
        };
        let body_end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());

        let name = format!("Query{}", &caps[2]);
        let sql = if body_start < body_end {
            sanitize_statement(&text[body_start..body_end])
        } else {
            String::new()
        };

        if sql.is_empty() {
            tracing::warn!("⚠️ {} has no SQL text, skipping", name);
            continue;
        }
        set.insert(name, sql);
    }

    set
}

/// 以 ';' 切割，略過字串、引號識別字與註解中的分號
pub fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            '-' if !in_single && !in_double && chars.peek() == Some(&'-') => {
                // 行註解直到行尾
                current.push(c);
                for next in chars.by_ref() {
                    current.push(next);
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if !in_single && !in_double && chars.peek() == Some(&'*') => {
                current.push(c);
                let mut prev = '\0';
                for next in chars.by_ref() {
                    current.push(next);
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            ';' if !in_single && !in_double => {
                statements.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    statements.push(current);

    statements
        .iter()
        .map(|s| sanitize_statement(s))
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--"))
        .map(sanitize_statement)
        .filter(|s| !s.is_empty())
        .collect()
}

fn name_statements(statements: Vec<String>) -> QuerySet {
    let mut set = QuerySet::new();
    if let [only] = statements.as_slice() {
        set.insert("Result", only.as_str());
        return set;
    }
    for (i, sql) in statements.into_iter().enumerate() {
        set.insert(format!("Query_{}", i + 1), sql);
    }
    set
}

/// 去掉前置的空行、註解與 SQL*Plus 指令，以及結尾所有的分號
pub fn sanitize_statement(statement: &str) -> String {
    let mut kept = Vec::new();
    let mut seen_sql = false;

    for line in statement.lines() {
        if !seen_sql {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") || is_sqlplus_directive(trimmed) {
                continue;
            }
            seen_sql = true;
        }
        kept.push(line);
    }

    let joined = kept.join("\n");
    let mut sql = joined.trim();
    while let Some(rest) = sql.strip_suffix(';') {
        sql = rest.trim_end();
    }
    sql.to_string()
}

fn is_sqlplus_directive(line: &str) -> bool {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return false;
    };
    let first = first.to_ascii_uppercase();

    if first == "SET" {
        return words
            .next()
            .map(|w| SQLPLUS_SETTINGS.contains(&w.to_ascii_uppercase().as_str()))
            .unwrap_or(false);
    }
    SQLPLUS_COMMANDS.contains(&first.as_str())
}
