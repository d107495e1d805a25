use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use weather_etl::config::Config;
use weather_etl::db::Repository;
use weather_etl::pipeline::EtlJob;
use weather_etl::scheduler::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,weather_etl=debug,sqlx=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // `--once` runs a single cycle for an external scheduler (cron, Airflow, ...)
    let run_once = std::env::args().skip(1).any(|arg| arg == "--once");

    info!("Weather ETL service starting...");

    let config_path =
        std::env::var("WEATHER_ETL_CONFIG").unwrap_or_else(|_| "config/config.yaml".to_string());
    let config = Config::load(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration from {}: {}\n\n\
             Make sure:\n\
             1. The config file exists (override with WEATHER_ETL_CONFIG)\n\
             2. All required environment variables are set (check .env.example)\n\
             3. Create a .env file if needed",
            config_path,
            e
        )
    })?;
    info!(
        "Configuration loaded: {} cities, {:?} flush, {:?} validation",
        config.pipeline.cities.len(),
        config.pipeline.flush,
        config.pipeline.validation
    );

    let connection_string = config.database.connection_string();
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to connect to database: {}\n\n\
                 Host: {}:{}\n\
                 Database: {}\n\
                 User: {}\n\n\
                 Common fixes:\n\
                 1. Ensure PostgreSQL is running\n\
                 2. Check username/password are correct (DB_USER, DB_PASSWORD)\n\
                 3. Verify database exists: createdb {}\n\
                 4. Check host and port (DB_HOST, DB_PORT)",
                e,
                config.database.host,
                config.database.port,
                config.database.name,
                config.database.user,
                config.database.name
            )
        })?;

    info!(
        "Connected to database: {}@{}:{}/{}",
        config.database.user, config.database.host, config.database.port, config.database.name
    );

    let repository = Arc::new(Repository::new(pool));
    repository.run_migrations().await?;

    let job = EtlJob::new(&config, repository)?;

    if run_once {
        let summary = job.run_cycle().await?;
        info!("ETL cycle completed: {}", summary);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut scheduler = Scheduler::new(config.scheduler.clone(), job, shutdown_rx);
    scheduler.run().await;

    info!("Weather ETL service shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
