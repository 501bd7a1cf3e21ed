use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// sqlx 每條語句都會記錄，預設只留警告
fn report_filter(verbose: bool) -> EnvFilter {
    let default = if verbose {
        "query_report=debug,sqlx=warn,lettre=info,info"
    } else {
        "query_report=info,sqlx=warn,lettre=warn"
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

pub fn init_cli_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(report_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// 給排程/CI 使用的 JSON 格式輸出，每筆都帶 target 以便過濾
pub fn init_json_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(report_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .json()
                .with_current_span(false),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters_quiet_sqlx() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let quiet = report_filter(false).to_string();
        assert!(quiet.contains("sqlx=warn"));
        assert!(quiet.contains("query_report=info"));

        let verbose = report_filter(true).to_string();
        assert!(verbose.contains("query_report=debug"));
    }
}
