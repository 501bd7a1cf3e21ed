use anyhow::Context;
use clap::Parser;
use query_report::config::cli::{Command, ConnectArgs, ConvertArgs, RunArgs, ZonesArgs};
use query_report::core::pipeline::dry_run_blocks;
use query_report::core::timezone::{
    convert, parse_timestamp, readable_offset, zones, Zone, TIMESTAMP_FORMAT,
};
use query_report::domain::model::{DeliveryStatus, RunSummary, SessionInfo, SheetKind};
use query_report::domain::ports::Database;
use query_report::utils::error::{ErrorSeverity, ReportError};
use query_report::utils::{logger, validation::Validate};
use query_report::{
    CliConfig, ExportEngine, LocalStorage, QueryPipeline, RunSettings, SmtpNotifier, SqlxDatabase,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI config: {:?}", cli);

    let result = match &cli.command {
        Command::Zones(args) => list_zones(args),
        Command::Convert(args) => convert_time(args),
        Command::Connect(args) => connect(&cli, args).await,
        Command::Run(args) => run(&cli, args).await,
    };

    if let Err(e) = result {
        let Some(report_error) = e.downcast_ref::<ReportError>() else {
            tracing::error!("❌ {:#}", e);
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        };

        tracing::error!(
            "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
            report_error,
            report_error.category(),
            report_error.severity()
        );
        eprintln!("❌ {}", report_error.user_friendly_message());
        eprintln!("💡 Suggestion: {}", report_error.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match report_error.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

fn list_zones(args: &ZonesArgs) -> anyhow::Result<()> {
    let filter = args.filter.as_deref().map(str::to_lowercase);
    for name in zones() {
        if filter
            .as_deref()
            .map_or(true, |f| name.to_lowercase().contains(f))
        {
            println!("{}", name);
        }
    }
    Ok(())
}

fn convert_time(args: &ConvertArgs) -> anyhow::Result<()> {
    let naive = parse_timestamp(&args.time)?.ok_or_else(|| ReportError::TimestampError {
        value: args.time.clone(),
        reason: "time is empty".to_string(),
    })?;
    let from = Zone::parse(&args.from)?;

    println!("{} ({})", naive.format(TIMESTAMP_FORMAT), from);
    for zone in args.target_zones() {
        let to = Zone::parse(&zone)?;
        println!("  {}: {}", to, convert(naive, &from, &to)?);
    }
    Ok(())
}

fn print_session(info: &SessionInfo) {
    let database_zone = info.database_timezone.as_deref().unwrap_or("");
    println!(
        "🗄️  Database timezone: {} ({})",
        database_zone,
        readable_offset(database_zone)
    );
    println!(
        "🌐 Session timezone: {}",
        info.session_timezone.as_deref().unwrap_or("unknown")
    );
    println!(
        "🕒 Current database time: {}",
        info.current_time.as_deref().unwrap_or("unknown")
    );
}

async fn connect(cli: &CliConfig, args: &ConnectArgs) -> anyhow::Result<()> {
    let settings = cli.connection_settings(&args.database)?;
    let url = settings.database.to_url()?;

    tracing::info!("🔌 Connecting to {}", settings.database.display());
    let database = SqlxDatabase::connect(&url).await?;
    println!("✅ Connected to {} ({})", settings.database.display(), database.backend());
    print_session(&database.session_info().await?);

    if let Some(zone) = &settings.session_timezone {
        let zone = Zone::parse(zone)?;
        database.set_session_timezone(&zone.name()).await?;
        let info = database.session_info().await?;
        println!(
            "🔁 Session timezone changed to {}",
            info.session_timezone.as_deref().unwrap_or("unknown")
        );
    }

    database.close().await?;
    Ok(())
}

/// 只顯示替換後的 SQL，不連線
async fn dry_run(settings: &RunSettings) -> anyhow::Result<()> {
    for block in dry_run_blocks(settings, &settings.source()?).await? {
        println!("-- {}\n{}\n", block.name, block.sql);
    }
    Ok(())
}

async fn run(cli: &CliConfig, args: &RunArgs) -> anyhow::Result<()> {
    let settings = cli.run_settings(args)?;
    settings.validate()?;

    if args.dry_run {
        return dry_run(&settings).await;
    }

    let source = settings.source()?;
    let notifier = settings.mail_settings()?.map(SmtpNotifier::new);
    let url = settings.database.to_url()?;
    let monitoring = settings.monitoring;
    if monitoring {
        tracing::info!("🔍 System monitoring enabled");
    }

    tracing::info!("🔌 Connecting to {}", settings.database.display());
    let database = SqlxDatabase::connect(&url).await?;
    let storage = LocalStorage::new(settings.output_path.clone());
    let pipeline = QueryPipeline::new(storage, database, settings, source);

    let mut engine = ExportEngine::new_with_monitoring(pipeline, monitoring);
    if let Some(notifier) = notifier {
        engine = engine.with_notifier(Box::new(notifier));
    }

    let summary = engine.run().await?;
    print_summary(&summary, cli.verbose)
}

fn print_summary(summary: &RunSummary, verbose: bool) -> anyhow::Result<()> {
    println!("✅ Query export completed successfully!");
    println!("📁 Output saved to: {}", summary.location);
    for sheet in &summary.sheets {
        match sheet.kind {
            SheetKind::Result => println!("   {}: {} rows", sheet.name, sheet.rows),
            SheetKind::Empty => println!("   {}: no data", sheet.name),
            SheetKind::Error => println!("   {}: failed", sheet.name),
        }
    }
    match &summary.delivery {
        DeliveryStatus::Skipped => {}
        DeliveryStatus::Sent { relay } => println!("📧 Email sent via {}", relay),
        DeliveryStatus::Failed { message } => println!("⚠️ Email not sent: {}", message),
    }

    if verbose {
        let json = serde_json::to_string_pretty(summary).context("serialising the run summary")?;
        println!("{}", json);
    }
    Ok(())
}
