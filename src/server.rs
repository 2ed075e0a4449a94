use crate::cli::Strategy;
use crate::config::Settings;
use crate::error::{FrontError, FrontResult};
use crate::handlers::Handler;
use crate::match_engine::MatchEngine;
use crate::stats::Stats;
use crate::strategies::{cooperative, thread_per_client, thread_per_request, Dispatch};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub struct Server {
    host: String,
    port: u16,
    strategy: Strategy,
    worker_count: usize,
    engine: Arc<MatchEngine<Handler>>,
    stats: Arc<Stats>,
}

impl Server {
    pub fn new(settings: Settings, strategy: Strategy, port_override: Option<u16>) -> FrontResult<Self> {
        let mut rules = Vec::with_capacity(settings.tasks.len());
        for entry in &settings.tasks {
            let handler = Handler::build(&entry.task)?;
            rules.push((entry.match_criteria(), handler));
        }

        Ok(Self {
            host: "0.0.0.0".to_string(),
            port: port_override.unwrap_or(settings.port),
            strategy,
            worker_count: num_cpus::get(),
            engine: Arc::new(MatchEngine::new(rules)),
            stats: Arc::new(Stats::new()),
        })
    }

    pub fn serve(self) -> FrontResult<()> {
        let shutdown = Arc::new(AtomicBool::new(false));

        let shutdown_signal = shutdown.clone();
        let stats_for_signal = self.stats.clone();
        ctrlc::set_handler(move || {
            let snapshot = stats_for_signal.snapshot();
            tracing::info!(%snapshot, "received shutdown signal, draining connections");
            shutdown_signal.store(true, Ordering::Release);
        })
        .map_err(|e| FrontError::Other(format!("failed to install SIGINT handler: {e}")))?;

        let shutdown_metrics = shutdown.clone();
        let stats_for_metrics = self.stats.clone();
        thread::Builder::new()
            .name("ravel-metrics".to_string())
            .spawn(move || {
                while !shutdown_metrics.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_secs(5));
                    if shutdown_metrics.load(Ordering::Acquire) {
                        break;
                    }
                    tracing::info!(stats = %stats_for_metrics.snapshot(), "periodic stats");
                }
            })
            .ok();

        tracing::info!(strategy = ?self.strategy, host = %self.host, port = self.port, "starting ravel");

        match self.strategy {
            Strategy::ThreadPerClient => {
                let dispatch = Arc::new(Dispatch {
                    engine: self.engine.clone(),
                    stats: self.stats.clone(),
                });
                thread_per_client::run(&self.host, self.port, dispatch, shutdown);
            }
            Strategy::ThreadPerRequest => {
                let dispatch = Arc::new(Dispatch {
                    engine: self.engine.clone(),
                    stats: self.stats.clone(),
                });
                thread_per_request::run(&self.host, self.port, dispatch, shutdown, self.worker_count);
            }
            Strategy::Cooperative => {
                cooperative::run(&self.host, self.port, self.engine.clone(), self.stats.clone(), shutdown);
            }
        }

        tracing::info!(stats = %self.stats.snapshot(), "ravel shut down");
        Ok(())
    }
}
