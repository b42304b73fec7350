//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "insumo";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_PROJECTION_TTL_SECS: u64 = 5 * 60;
const DEFAULT_HISTORICAL_TTL_SECS: u64 = 10 * 60;
const DEFAULT_CATALOG_TTL_SECS: u64 = 30 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;
// Seconds-minutes-hours form; mornings of the 6th, 16th and 25th.
const DEFAULT_ALERTS_CRON: &str = "0 0 8 6,16,25 * *";
const DEFAULT_MAIL_FROM: &str = "alerts@insumo.local";

/// Command-line arguments for the insumo binary.
#[derive(Debug, Parser)]
#[command(name = "insumo", version, about = "Materials consumption monitor")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "INSUMO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Dispatch the growth alert once and exit.
    #[command(name = "send-alerts")]
    SendAlerts(SendAlertsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SendAlertsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the mail relay endpoint.
    #[arg(long = "mail-relay-url", value_name = "URL")]
    pub mail_relay_url: Option<String>,

    /// Override the mail sender address.
    #[arg(long = "mail-from", value_name = "ADDRESS")]
    pub mail_from: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the projection report TTL.
    #[arg(long = "cache-projection-ttl-seconds", value_name = "SECONDS")]
    pub cache_projection_ttl_seconds: Option<u64>,

    /// Override the historical report TTL.
    #[arg(long = "cache-historical-ttl-seconds", value_name = "SECONDS")]
    pub cache_historical_ttl_seconds: Option<u64>,

    /// Override the catalog report TTL.
    #[arg(long = "cache-catalog-ttl-seconds", value_name = "SECONDS")]
    pub cache_catalog_ttl_seconds: Option<u64>,

    /// Override the expired-entry sweep interval.
    #[arg(long = "cache-sweep-interval-seconds", value_name = "SECONDS")]
    pub cache_sweep_interval_seconds: Option<u64>,

    /// Override the alert dispatch cron expression.
    #[arg(long = "alerts-cron", value_name = "EXPR")]
    pub alerts_cron: Option<String>,

    /// Override the mail relay endpoint.
    #[arg(long = "mail-relay-url", value_name = "URL")]
    pub mail_relay_url: Option<String>,

    /// Override the mail sender address.
    #[arg(long = "mail-from", value_name = "ADDRESS")]
    pub mail_from: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub alerts: AlertsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub projection_ttl: Duration,
    pub historical_ttl: Duration,
    pub catalog_ttl: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AlertsSettings {
    /// Seconds-resolution cron expression, validated at load time.
    pub cron: String,
    pub relay_url: Option<String>,
    pub from: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("INSUMO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::SendAlerts(args)) => raw.apply_send_alerts_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    alerts: RawAlertsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(ttl) = overrides.cache_projection_ttl_seconds {
            self.cache.projection_ttl_seconds = Some(ttl);
        }
        if let Some(ttl) = overrides.cache_historical_ttl_seconds {
            self.cache.historical_ttl_seconds = Some(ttl);
        }
        if let Some(ttl) = overrides.cache_catalog_ttl_seconds {
            self.cache.catalog_ttl_seconds = Some(ttl);
        }
        if let Some(interval) = overrides.cache_sweep_interval_seconds {
            self.cache.sweep_interval_seconds = Some(interval);
        }
        if let Some(cron) = overrides.alerts_cron.as_ref() {
            self.alerts.cron = Some(cron.clone());
        }
        if let Some(url) = overrides.mail_relay_url.as_ref() {
            self.alerts.relay_url = Some(url.clone());
        }
        if let Some(from) = overrides.mail_from.as_ref() {
            self.alerts.from = Some(from.clone());
        }
    }

    fn apply_send_alerts_overrides(&mut self, args: &SendAlertsArgs) {
        if let Some(url) = args.database.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(url) = args.mail_relay_url.as_ref() {
            self.alerts.relay_url = Some(url.clone());
        }
        if let Some(from) = args.mail_from.as_ref() {
            self.alerts.from = Some(from.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            alerts,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            alerts: build_alerts_settings(alerts)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let projection = cache
        .projection_ttl_seconds
        .unwrap_or(DEFAULT_PROJECTION_TTL_SECS);
    let historical = cache
        .historical_ttl_seconds
        .unwrap_or(DEFAULT_HISTORICAL_TTL_SECS);
    let catalog = cache.catalog_ttl_seconds.unwrap_or(DEFAULT_CATALOG_TTL_SECS);
    let sweep = cache
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    for (value, key) in [
        (projection, "cache.projection_ttl_seconds"),
        (historical, "cache.historical_ttl_seconds"),
        (catalog, "cache.catalog_ttl_seconds"),
        (sweep, "cache.sweep_interval_seconds"),
    ] {
        if value == 0 {
            return Err(LoadError::invalid(key, "must be greater than zero"));
        }
    }

    Ok(CacheSettings {
        projection_ttl: Duration::from_secs(projection),
        historical_ttl: Duration::from_secs(historical),
        catalog_ttl: Duration::from_secs(catalog),
        sweep_interval: Duration::from_secs(sweep),
    })
}

fn build_alerts_settings(alerts: RawAlertsSettings) -> Result<AlertsSettings, LoadError> {
    let cron = alerts
        .cron
        .unwrap_or_else(|| DEFAULT_ALERTS_CRON.to_string());
    cron::Schedule::from_str(&cron)
        .map_err(|err| LoadError::invalid("alerts.cron", format!("failed to parse: {err}")))?;

    let relay_url = alerts.relay_url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let from = alerts.from.unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string());
    if !from.contains('@') {
        return Err(LoadError::invalid(
            "alerts.from",
            "sender must be an email address",
        ));
    }

    Ok(AlertsSettings {
        cron,
        relay_url,
        from,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    projection_ttl_seconds: Option<u64>,
    historical_ttl_seconds: Option<u64>,
    catalog_ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAlertsSettings {
    cron: Option<String>,
    relay_url: Option<String>,
    from: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn cache_ttls_default_to_5_10_30_minutes() {
        let raw = RawSettings::default();
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.cache.projection_ttl, Duration::from_secs(300));
        assert_eq!(settings.cache.historical_ttl, Duration::from_secs(600));
        assert_eq!(settings.cache.catalog_ttl, Duration::from_secs(1800));
        assert_eq!(settings.cache.sweep_interval, Duration::from_secs(600));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut raw = RawSettings::default();
        raw.cache.historical_ttl_seconds = Some(0);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key, .. }) if key == "cache.historical_ttl_seconds"
        ));
    }

    #[test]
    fn malformed_cron_is_rejected_at_load() {
        let mut raw = RawSettings::default();
        raw.alerts.cron = Some("whenever".to_string());
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key, .. }) if key == "alerts.cron"
        ));
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["insumo"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "insumo",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--database-url",
            "postgres://override",
            "--cache-sweep-interval-seconds",
            "120",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.database_url.as_deref(),
                    Some("postgres://override")
                );
                assert_eq!(serve.overrides.cache_sweep_interval_seconds, Some(120));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_send_alerts_arguments() {
        let args = CliArgs::parse_from([
            "insumo",
            "send-alerts",
            "--database-url",
            "postgres://example",
            "--mail-relay-url",
            "http://relay.local/send",
        ]);

        match args.command.expect("send-alerts command") {
            Command::SendAlerts(send) => {
                assert_eq!(
                    send.database.database_url.as_deref(),
                    Some("postgres://example")
                );
                assert_eq!(
                    send.mail_relay_url.as_deref(),
                    Some("http://relay.local/send")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
