use crate::config::{Config, FlushPolicy, ValidationPolicy};
use crate::db::models::{CityBatch, WeatherRecord};
use crate::db::Sink;
use crate::error::{AppError, FetchError, Result, SchemaError};
use crate::fetcher::Fetcher;
use crate::transformer::Transformer;
use crate::validator::{ValidationStatus, Validator};
use chrono::Utc;
use futures_util::stream::{FuturesOrdered, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Outcome of one batch pass.
///
/// `processed + skipped` always equals the number of cities in the pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Cities whose record was accepted for loading.
    pub processed: usize,
    /// Cities that produced no loadable record, for any reason.
    pub skipped: usize,
    /// Records the validator flagged (loaded or rejected depending on policy).
    pub invalid: usize,
    /// Cities whose payload did not match the expected shape.
    pub schema_errors: usize,
    /// Cities never attempted because shutdown was requested.
    pub cancelled: usize,
    /// Rows newly written by the sink; duplicates are not counted.
    pub rows_written: u64,
    /// One message per failed sink call.
    pub load_errors: Vec<String>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} skipped ({} schema errors, {} cancelled), {} invalid, {} rows written, {} load errors",
            self.processed,
            self.skipped,
            self.schema_errors,
            self.cancelled,
            self.invalid,
            self.rows_written,
            self.load_errors.len()
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub flush: FlushPolicy,
    pub validation: ValidationPolicy,
    pub max_concurrent_fetches: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            flush: FlushPolicy::EndOfPass,
            validation: ValidationPolicy::Advisory,
            max_concurrent_fetches: 1,
        }
    }
}

impl RunnerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flush: config.pipeline.flush,
            validation: config.pipeline.validation,
            max_concurrent_fetches: config.source.max_concurrent_fetches,
        }
    }
}

enum CityOutcome {
    Transformed {
        record: WeatherRecord,
        status: ValidationStatus,
    },
    FetchFailed(FetchError),
    SchemaFailed(SchemaError),
    Cancelled,
}

/// Drives fetch, transform and validate for each city and hands accepted
/// records to the sink.
pub struct BatchRunner<S: Sink> {
    fetcher: Fetcher,
    sink: Arc<S>,
    options: RunnerOptions,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl<S: Sink> BatchRunner<S> {
    pub fn new(fetcher: Fetcher, sink: Arc<S>, options: RunnerOptions) -> Self {
        Self {
            fetcher,
            sink,
            options,
            shutdown_rx: None,
        }
    }

    /// Stop starting new cities once `shutdown_rx` reads `true`.
    pub fn with_shutdown(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Run one batch pass over `cities`.
    ///
    /// Per-city failures are logged and counted, never returned. Fetches may
    /// overlap up to `max_concurrent_fetches`, but results are consumed in
    /// city order and every sink call is made from this loop, one at a time.
    /// Fetches already in flight keep being driven while a flush is awaited,
    /// so a slow store cannot push them past their request timeout.
    pub async fn run(&self, cities: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut pending = CityBatch::new();
        let limit = self.options.max_concurrent_fetches.max(1);

        info!(
            "Starting batch pass over {} cities ({:?} flush, {:?} validation, concurrency {})",
            cities.len(),
            self.options.flush,
            self.options.validation,
            self.options.max_concurrent_fetches
        );

        let mut queue = cities.iter();
        let mut in_flight = FuturesOrdered::new();
        // Outcomes that completed while a flush was running, in city order
        let mut ready = VecDeque::new();

        for city in cities {
            while in_flight.len() + ready.len() < limit {
                match queue.next() {
                    Some(next) => in_flight.push_back(self.process_city(next)),
                    None => break,
                }
            }

            let outcome = match ready.pop_front() {
                Some(outcome) => outcome,
                None => match in_flight.next().await {
                    Some(outcome) => outcome,
                    None => break,
                },
            };

            match outcome {
                CityOutcome::Transformed { record, status } => {
                    if !status.is_ok() {
                        summary.invalid += 1;
                        if self.options.validation == ValidationPolicy::Reject {
                            warn!("Rejecting record for {} due to missing values", city);
                            summary.skipped += 1;
                            continue;
                        }
                    }

                    pending.push(record);
                    summary.processed += 1;

                    if self.options.flush == FlushPolicy::PerCity {
                        let flush = self.flush(&mut pending, &mut summary);
                        tokio::pin!(flush);
                        loop {
                            tokio::select! {
                                biased;
                                () = &mut flush => break,
                                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                                    ready.push_back(outcome);
                                }
                            }
                        }
                    }
                }
                CityOutcome::FetchFailed(e) => {
                    warn!("Skipping {} due to extraction errors: {}", city, e);
                    summary.skipped += 1;
                }
                CityOutcome::SchemaFailed(e) => {
                    error!(
                        "Skipping {}: provider payload no longer matches expected schema: {}",
                        city, e
                    );
                    summary.schema_errors += 1;
                    summary.skipped += 1;
                }
                CityOutcome::Cancelled => {
                    summary.cancelled += 1;
                    summary.skipped += 1;
                }
            }
        }

        if summary.cancelled > 0 {
            info!(
                "Shutdown requested, {} cities were not attempted",
                summary.cancelled
            );
        }

        // End of pass, and for per-city flushing anything a failed flush left behind
        self.flush(&mut pending, &mut summary).await;

        info!("Batch pass complete: {}", summary);
        summary
    }

    async fn process_city(&self, city: &str) -> CityOutcome {
        if self.is_shutdown_requested() {
            return CityOutcome::Cancelled;
        }

        info!("Processing weather data for {}...", city);
        let capture_time = Utc::now();

        let raw = match self.fetcher.fetch(city).await {
            Ok(raw) => raw,
            Err(e) => return CityOutcome::FetchFailed(e),
        };

        match Transformer::transform(&raw, city, capture_time) {
            Ok(record) => {
                let status = Validator::validate(&record);
                CityOutcome::Transformed { record, status }
            }
            Err(e) => CityOutcome::SchemaFailed(e),
        }
    }

    /// Hand pending records to the sink. On failure they stay pending.
    async fn flush(&self, pending: &mut CityBatch, summary: &mut RunSummary) {
        if pending.is_empty() {
            return;
        }

        match self.sink.load(pending).await {
            Ok(rows) => {
                info!("Loaded {} records ({} new rows)", pending.len(), rows);
                summary.rows_written += rows;
                pending.clear();
            }
            Err(e) => {
                error!("Failed to load {} records: {}", pending.len(), e);
                summary.load_errors.push(e.to_string());
            }
        }
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }
}

/// One ETL cycle over the configured cities.
///
/// This is what a scheduler invokes on each tick.
pub struct EtlJob<S: Sink> {
    runner: BatchRunner<S>,
    cities: Vec<String>,
}

impl<S: Sink> EtlJob<S> {
    pub fn new(config: &Config, sink: Arc<S>) -> Result<Self> {
        let fetcher = Fetcher::from_config(&config.source)?;
        let runner = BatchRunner::new(fetcher, sink, RunnerOptions::from_config(config));

        Ok(Self {
            runner,
            cities: config.pipeline.cities.clone(),
        })
    }

    pub fn from_parts(runner: BatchRunner<S>, cities: Vec<String>) -> Self {
        Self { runner, cities }
    }

    pub fn with_shutdown(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.runner = self.runner.with_shutdown(shutdown_rx);
        self
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    /// Run exactly one batch pass.
    ///
    /// Only a pass that produced no usable record at all is an error; cities
    /// skipped because of shutdown do not count against it.
    pub async fn run_cycle(&self) -> Result<RunSummary> {
        let summary = self.runner.run(&self.cities).await;

        if summary.processed == 0 && summary.cancelled < self.cities.len() {
            return Err(AppError::NoUsableRecords {
                cities: self.cities.len(),
            });
        }

        Ok(summary)
    }
}
