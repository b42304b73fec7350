use std::{process, sync::Arc, time::Duration};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use insumo::{
    application::{
        alerts::AlertService,
        batch::BatchService,
        error::AppError,
        jobs::{GrowthAlertContext, growth_alert_schedule, process_growth_alert_job},
        reports::ReportService,
        repos::{RecipientsRepo, WarehouseGateway},
    },
    cache::{CacheConfig, TtlStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        mailer::{AlertMailer, DisabledMailer, HttpRelayMailer},
        telemetry,
    },
};
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::SendAlerts(_) => run_send_alerts(settings).await,
    }
}

struct ApplicationContext {
    api_state: ApiState,
    alerts: Arc<AlertService>,
    cache: Arc<TtlStore>,
    sweep_interval: Duration,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> ApplicationContext {
    let gateway: Arc<dyn WarehouseGateway> = repositories.clone();
    let recipients: Arc<dyn RecipientsRepo> = repositories.clone();

    let cache = Arc::new(TtlStore::new());
    let reports = Arc::new(ReportService::new(
        gateway,
        cache.clone(),
        CacheConfig::from(&settings.cache),
    ));
    let batch = Arc::new(BatchService::new(reports.clone()));

    let mailer: Arc<dyn AlertMailer> = match settings.alerts.relay_url.as_ref() {
        Some(url) => Arc::new(HttpRelayMailer::new(
            url.clone(),
            settings.alerts.from.clone(),
        )),
        None => {
            warn!("no mail relay configured, alert delivery is disabled");
            Arc::new(DisabledMailer)
        }
    };
    let alerts = Arc::new(AlertService::new(recipients, reports.clone(), mailer));

    let api_state = ApiState {
        reports,
        batch,
        alerts: alerts.clone(),
        db: repositories,
    };

    ApplicationContext {
        api_state,
        alerts,
        cache,
        sweep_interval: settings.cache.sweep_interval,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings);

    // One sweep of expired cache entries at startup, then on the interval.
    let sweep_cache = app.cache.clone();
    let sweep_interval = app.sweep_interval;
    let sweep_handle = tokio::spawn(async move {
        sweep_cache.cleanup();
        let mut interval = tokio::time::interval(sweep_interval);
        interval.tick().await; // Consume the immediate first tick
        loop {
            interval.tick().await;
            let removed = sweep_cache.cleanup();
            if removed > 0 {
                debug!(removed, "expired cache entries swept");
            }
        }
    });

    let monitor_handle = spawn_alert_monitor(app.alerts.clone(), &settings.alerts)?;

    let result = serve_http(&settings, app.api_state).await;

    monitor_handle.abort();
    let _ = monitor_handle.await;

    sweep_handle.abort();
    let _ = sweep_handle.await;

    result
}

async fn run_send_alerts(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings);

    let summary = app.alerts.dispatch().await?;
    info!(
        sent = summary.sent,
        failed = summary.failed,
        "manual growth alert dispatch finished"
    );
    let rendered = serde_json::to_string_pretty(&summary)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{rendered}");

    if summary.ok {
        Ok(())
    } else {
        Err(AppError::unexpected("one or more deliveries failed"))
    }
}

fn spawn_alert_monitor(
    alerts: Arc<AlertService>,
    settings: &config::AlertsSettings,
) -> Result<tokio::task::JoinHandle<()>, AppError> {
    // The expression was validated at config load; this re-parse is the
    // typed handoff to the cron stream.
    let schedule = growth_alert_schedule(&settings.cron)
        .map_err(|err| AppError::unexpected(format!("invalid alert schedule: {err}")))?;

    let worker = WorkerBuilder::new("growth-alert-worker")
        .data(GrowthAlertContext { alerts })
        .backend(CronStream::new(schedule))
        .build_fn(process_growth_alert_job);

    let monitor = Monitor::new().register(worker);

    Ok(tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "alert monitor stopped");
        }
    }))
}

async fn serve_http(settings: &config::Settings, api_state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(api_state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(addr = %settings.server.addr, "listening");

    let drain_timeout = settings.server.graceful_shutdown;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!(
                timeout_secs = drain_timeout.as_secs(),
                "shutdown signal received, draining connections"
            );
        })
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
