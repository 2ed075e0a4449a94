use crate::handlers::Handler;
use crate::match_engine::MatchEngine;
use crate::scheduler::Scheduler;
use crate::stats::Stats;
use crate::syscalls;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Purely single-threaded: one thread runs the whole accept/read/parse/
/// handle/write pipeline for every connection, cooperatively, via
/// [`Scheduler`]. No OS thread ever blocks waiting on a socket.
pub fn run(
    host: &str,
    port: u16,
    engine: Arc<MatchEngine<Handler>>,
    stats: Arc<Stats>,
    shutdown: Arc<AtomicBool>,
) {
    let listen_fd = match syscalls::create_listen_socket(host, port) {
        Ok(fd) => fd,
        Err(e) => {
            tracing::error!(error = %e, "cooperative: failed to bind listener");
            return;
        }
    };

    let mut scheduler = match Scheduler::new(listen_fd, engine, stats, 10_000) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "cooperative: failed to create scheduler");
            return;
        }
    };

    tracing::info!(%host, port, "cooperative strategy listening");
    scheduler.run(shutdown);
}
