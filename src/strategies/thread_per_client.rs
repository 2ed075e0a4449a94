use super::{Dispatch, MAX_REQUESTS_PER_CONNECTION};
use crate::syscalls;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// One blocking OS thread per client connection. Simplest of the three
/// strategies and the one with the worst memory scaling under high
/// concurrency, since every connection costs a full thread stack — kept
/// around because it is trivially correct and a useful baseline to measure
/// the other two strategies against.
const IDLE_TIMEOUT_SECS: i64 = 3;

pub fn run(host: &str, port: u16, dispatch: Arc<Dispatch>, shutdown: Arc<AtomicBool>) {
    let listen_fd = match syscalls::create_listen_socket(host, port) {
        Ok(fd) => fd,
        Err(e) => {
            tracing::error!(error = %e, "thread-per-client: failed to bind listener");
            return;
        }
    };
    // Blocking accept loop: the listener itself stays non-blocking so the
    // shutdown flag can be polled between accepts without getting stuck in
    // an indefinite `accept()`.
    tracing::info!(%host, port, "thread-per-client strategy listening");

    while !shutdown.load(Ordering::Acquire) {
        match syscalls::accept_connection(listen_fd) {
            Ok(Some(client_fd)) => {
                syscalls::set_blocking(client_fd).ok();
                syscalls::set_timeout(client_fd, IDLE_TIMEOUT_SECS).ok();
                let dispatch = dispatch.clone();
                thread::spawn(move || {
                    // Repeats read -> parse -> dispatch -> write on this same
                    // socket for as long as the client keeps it open: the
                    // loop only ends on client close, idle timeout (surfaced
                    // as a read/write error by `SO_RCVTIMEO`/`SO_SNDTIMEO`),
                    // a malformed request, or an unrecoverable write error.
                    let mut requests = 0u32;
                    loop {
                        match dispatch.serve_once(client_fd) {
                            Ok(true) => {
                                requests += 1;
                                if requests >= MAX_REQUESTS_PER_CONNECTION {
                                    break;
                                }
                            }
                            Ok(false) | Err(_) => break,
                        }
                    }
                    syscalls::close_fd(client_fd);
                });
            }
            Ok(None) => {
                thread::sleep(std::time::Duration::from_millis(20));
            }
            Err(e) => {
                tracing::warn!(error = %e, "thread-per-client: accept failed");
            }
        }
    }

    syscalls::close_fd(listen_fd);
}
