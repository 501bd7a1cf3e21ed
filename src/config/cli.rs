use crate::adapters::mail::{parse_recipients, SmtpRelay};
use crate::config::connection::ConnectionDetails;
use crate::config::settings::RunSettings;
use crate::config::toml_config::TomlConfig;
use crate::domain::model::{
    ErrorPolicy, OutputFormat, ParseMode, PlaceholderStyle, DEFAULT_DISPLAY_TIMEZONES,
};
use crate::utils::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "query-report")]
#[command(about = "Run post-test SQL queries and export the results to a spreadsheet")]
pub struct CliConfig {
    #[arg(short, long, global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Connect, show the database and session timezone, then disconnect
    Connect(ConnectArgs),
    /// Parse, substitute and execute queries, then export the results
    Run(RunArgs),
    /// Convert a timestamp into other timezones
    Convert(ConvertArgs),
    /// List the known timezone names
    Zones(ZonesArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct DatabaseArgs {
    #[arg(long, help = "Full database URL (sqlite::memory:, postgres://...)")]
    pub database_url: Option<String>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, help = "Database / service name")]
    pub service: Option<String>,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    #[arg(long, help = "Switch the session to this timezone before running")]
    pub session_timezone: Option<String>,
}

impl DatabaseArgs {
    pub fn connection(&self) -> ConnectionDetails {
        ConnectionDetails {
            url: self.database_url.clone(),
            host: self.host.clone(),
            port: self.port,
            service: self.service.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    #[arg(short, long, conflicts_with = "sql", help = "Text file with the queries")]
    pub file: Option<PathBuf>,

    #[arg(long, help = "A single query to run")]
    pub sql: Option<String>,

    #[arg(long, value_enum)]
    pub parse_mode: Option<ParseMode>,

    #[arg(long, help = "Test start time (YYYY-MM-DD HH:MM:SS)")]
    pub start: Option<String>,

    #[arg(long, help = "Test end time (YYYY-MM-DD HH:MM:SS)")]
    pub end: Option<String>,

    #[arg(long, help = "Timezone the start/end times are given in")]
    pub input_timezone: Option<String>,

    #[arg(long, help = "Timezone substituted into the SQL, or 'database'")]
    pub target_timezone: Option<String>,

    #[arg(long, value_delimiter = ',')]
    pub display_timezones: Vec<String>,

    #[arg(long, value_enum)]
    pub placeholder_style: Option<PlaceholderStyle>,

    #[arg(long, value_enum)]
    pub on_error: Option<ErrorPolicy>,

    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    #[arg(short, long)]
    pub output_path: Option<String>,

    #[arg(long)]
    pub prefix: Option<String>,

    #[arg(long, help = "Email the spreadsheet when done")]
    pub email: bool,

    #[arg(long)]
    pub email_from: Option<String>,

    #[arg(long, help = "Comma separated recipients")]
    pub email_to: Option<String>,

    #[arg(long = "smtp-relay", help = "host[:port], tried in the given order")]
    pub smtp_relays: Vec<String>,

    #[arg(long, help = "Upgrade the SMTP relays with STARTTLS")]
    pub starttls: bool,

    #[arg(long, help = "Show the substituted SQL without connecting")]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ConvertArgs {
    #[arg(long, help = "Timestamp to convert (YYYY-MM-DD HH:MM:SS)")]
    pub time: String,

    #[arg(long, default_value = "UTC")]
    pub from: String,

    #[arg(long = "to", value_delimiter = ',')]
    pub zones: Vec<String>,
}

impl ConvertArgs {
    pub fn target_zones(&self) -> Vec<String> {
        if self.zones.is_empty() {
            DEFAULT_DISPLAY_TIMEZONES
                .iter()
                .map(|z| z.to_string())
                .collect()
        } else {
            self.zones.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct ZonesArgs {
    #[arg(help = "Only list zones containing this text")]
    pub filter: Option<String>,
}

impl CliConfig {
    pub fn load_file_config(&self) -> Result<TomlConfig> {
        match &self.config {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                TomlConfig::from_file(path)
            }
            None => Ok(TomlConfig::default()),
        }
    }

    pub fn connection_settings(&self, args: &DatabaseArgs) -> Result<RunSettings> {
        let mut settings = RunSettings::from_config(self.load_file_config()?);
        settings.database = settings.database.merge(args.connection());
        if args.session_timezone.is_some() {
            settings.session_timezone = args.session_timezone.clone();
        }
        settings.monitoring |= self.monitor;
        Ok(settings)
    }

    pub fn run_settings(&self, args: &RunArgs) -> Result<RunSettings> {
        let mut settings = self.connection_settings(&args.database)?;
        args.apply(&mut settings)?;
        Ok(settings)
    }
}

impl RunArgs {
    /// 命令列有給的值覆蓋設定檔
    pub fn apply(&self, settings: &mut RunSettings) -> Result<()> {
        if let Some(file) = &self.file {
            settings.query_file = Some(file.clone());
            settings.inline_sql = None;
        }
        if let Some(sql) = &self.sql {
            settings.inline_sql = Some(sql.clone());
            settings.query_file = None;
        }
        if let Some(mode) = self.parse_mode {
            settings.parse_mode = mode;
        }

        let time = &mut settings.time;
        if self.start.is_some() {
            time.start = self.start.clone();
        }
        if self.end.is_some() {
            time.end = self.end.clone();
        }
        if self.input_timezone.is_some() {
            time.input_timezone = self.input_timezone.clone();
        }
        if self.target_timezone.is_some() {
            time.target_timezone = self.target_timezone.clone();
        }
        if !self.display_timezones.is_empty() {
            time.display_timezones = self.display_timezones.clone();
        }
        if let Some(style) = self.placeholder_style {
            time.placeholder_style = style;
        }

        if let Some(policy) = self.on_error {
            settings.error_policy = policy;
        }
        if let Some(format) = self.format {
            settings.output_format = format;
        }
        if let Some(path) = &self.output_path {
            settings.output_path = path.clone();
        }
        if let Some(prefix) = &self.prefix {
            settings.file_prefix = prefix.clone();
        }

        let email = &mut settings.email;
        email.enabled |= self.email;
        if self.email_from.is_some() {
            email.sender = self.email_from.clone();
        }
        if let Some(to) = &self.email_to {
            email.recipients = parse_recipients(to);
        }
        if !self.smtp_relays.is_empty() {
            email.relays = self
                .smtp_relays
                .iter()
                .map(|r| SmtpRelay::parse(r))
                .collect::<Result<Vec<_>>>()?;
        }
        if self.starttls {
            for relay in &mut email.relays {
                relay.starttls = true;
            }
        }
        Ok(())
    }
}
