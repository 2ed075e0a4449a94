use super::{Dispatch, MAX_REQUESTS_PER_CONNECTION};
use crate::syscalls::{self, EPOLLIN, Epoll, epoll_event};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

/// Non-blocking listener dispatching readiness events to a fixed worker
/// pool, one request at a time per connection. A connection is added to
/// `in_service` the moment it is handed to a worker and removed once the
/// worker reports back; readiness events for an in-service connection are
/// ignored, since level-triggered polling would otherwise redeliver the same
/// readable fd while a worker is still draining it. A connection that is
/// still alive after a request (not closed, not idle-timed-out, not
/// malformed) is re-armed with epoll instead of closed, so the next request
/// on the same kept-alive connection is picked up by a later readiness event
/// and handed to a (possibly different) worker in its turn.
pub fn run(
    host: &str,
    port: u16,
    dispatch: Arc<Dispatch>,
    shutdown: Arc<AtomicBool>,
    worker_count: usize,
) {
    let listen_fd = match syscalls::create_listen_socket(host, port) {
        Ok(fd) => fd,
        Err(e) => {
            tracing::error!(error = %e, "thread-per-request: failed to bind listener");
            return;
        }
    };

    let epoll = match Epoll::new() {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "thread-per-request: failed to create epoll instance");
            return;
        }
    };
    if let Err(e) = epoll.add(listen_fd, u64::MAX, EPOLLIN) {
        tracing::error!(error = %e, "thread-per-request: failed to register listener");
        return;
    }

    let (job_tx, job_rx) = mpsc::channel::<i32>();
    let job_rx = Arc::new(std::sync::Mutex::new(job_rx));
    let (done_tx, done_rx) = mpsc::channel::<(i32, bool)>();

    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let job_rx = job_rx.clone();
        let done_tx = done_tx.clone();
        let dispatch = dispatch.clone();
        workers.push(thread::spawn(move || loop {
            let fd = {
                let rx = job_rx.lock().unwrap();
                rx.recv()
            };
            match fd {
                Ok(fd) => {
                    let keep_alive = matches!(dispatch.serve_once(fd), Ok(true));
                    if !keep_alive {
                        syscalls::close_fd(fd);
                    }
                    done_tx.send((fd, keep_alive)).ok();
                }
                Err(_) => break, // channel closed, shutting down
            }
        }));
    }

    let mut in_service: HashSet<i32> = HashSet::new();
    let mut request_counts: HashMap<i32, u32> = HashMap::new();
    let mut events = vec![epoll_event { events: 0, u64: 0 }; 1024];

    tracing::info!(%host, port, worker_count, "thread-per-request strategy listening");

    while !shutdown.load(Ordering::Acquire) {
        while let Ok((fd, keep_alive)) = done_rx.try_recv() {
            in_service.remove(&fd);
            if keep_alive {
                let count = request_counts.entry(fd).or_insert(0);
                *count += 1;
                if *count >= MAX_REQUESTS_PER_CONNECTION {
                    request_counts.remove(&fd);
                    syscalls::close_fd(fd);
                } else if epoll.add(fd, fd as u64, EPOLLIN).is_err() {
                    request_counts.remove(&fd);
                    syscalls::close_fd(fd);
                }
            } else {
                request_counts.remove(&fd);
            }
        }

        let n = match epoll.wait(&mut events, 200) {
            Ok(n) => n,
            Err(_) => continue,
        };

        for event in events.iter().take(n) {
            if event.u64 == u64::MAX {
                loop {
                    match syscalls::accept_connection(listen_fd) {
                        Ok(Some(client_fd)) => {
                            if epoll.add(client_fd, client_fd as u64, EPOLLIN).is_err() {
                                syscalls::close_fd(client_fd);
                            }
                        }
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }
            } else {
                let fd = event.u64 as i32;
                if in_service.contains(&fd) {
                    continue;
                }
                in_service.insert(fd);
                epoll.delete(fd).ok();
                job_tx.send(fd).ok();
            }
        }
    }

    drop(job_tx);
    for w in workers {
        w.join().ok();
    }
    syscalls::close_fd(listen_fd);
}
