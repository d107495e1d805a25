use crate::config::SchedulerConfig;
use crate::db::Sink;
use crate::pipeline::EtlJob;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Runs an [`EtlJob`] on a fixed interval until shutdown is signalled.
pub struct Scheduler<S: Sink> {
    config: SchedulerConfig,
    job: EtlJob<S>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S: Sink> Scheduler<S> {
    pub fn new(
        config: SchedulerConfig,
        job: EtlJob<S>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            job: job.with_shutdown(shutdown_rx.clone()),
            shutdown_rx,
        }
    }

    pub async fn run(&mut self) {
        let initial_delay = Duration::from_secs(self.config.initial_delay_seconds);
        let poll_interval = Duration::from_secs(self.config.interval_minutes * 60);

        info!(
            "Scheduler starting with {}s initial delay, {}m interval",
            self.config.initial_delay_seconds, self.config.interval_minutes
        );

        tokio::select! {
            _ = tokio::time::sleep(initial_delay) => {},
            _ = self.shutdown_rx.changed() => {
                info!("Shutdown received during initial delay");
                return;
            }
        }

        // Run immediately, then on interval
        self.run_cycle().await;

        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // First tick is immediate, skip it

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }
    }

    async fn run_cycle(&self) {
        info!("Starting ETL cycle for {} cities", self.job.cities().len());

        match self.job.run_cycle().await {
            Ok(summary) => info!("ETL cycle completed: {}", summary),
            Err(e) => error!("ETL cycle failed: {}", e),
        }
    }
}
