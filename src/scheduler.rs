use crate::conn::{Conn, ConnState, READ_BUF_SIZE};
use crate::config::Upstream;
use crate::error::FrontResult;
use crate::handlers::Handler;
use crate::match_engine::MatchEngine;
use crate::parser;
use crate::slab::ConnectionSlab;
use crate::stats::Stats;
use crate::strategies::MAX_REQUESTS_PER_CONNECTION;
use crate::syscalls::{self, EPOLLIN, EPOLLOUT, Epoll, ReadOutcome, epoll_event};
use libc::c_int;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a suspended per-connection computation is waiting on: either a file
/// descriptor becoming readable/writable, or (reserved for future idle/
/// timeout handling) a wall-clock deadline. A connection's state machine
/// only ever has one outstanding task at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceTask {
    Readable(c_int),
    Writable(c_int),
}

#[derive(Debug, Clone, Copy)]
pub struct TimedTask {
    pub deadline_secs: u32,
}

/// Which leg of the upstream round-trip an in-flight proxy/load-balance
/// connection is suspended on. Mirrors the `ResourceTask::{Readable,
/// Writable}` vocabulary above: `Connecting` and `Writing` both wait on the
/// upstream fd becoming writable (the first write-readiness notification
/// after a non-blocking `connect()` means "the connect finished, check
/// `SO_ERROR`", every one after that means "the socket can take more of the
/// request"), `Reading` waits on it becoming readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpstreamStage {
    Connecting,
    Writing,
    Reading,
}

/// One in-flight async reverse-proxy/load-balance round trip, keyed by the
/// client connection's slab index. Holds the upstream fd and exactly the
/// state needed to resume the next leg: the client's request bytes still to
/// be written, or the upstream's response bytes accumulated so far.
struct UpstreamConn {
    fd: c_int,
    stage: UpstreamStage,
    request: Vec<u8>,
    write_pos: usize,
    response: Vec<u8>,
}

/// High bit distinguishing an upstream-fd epoll token from a client
/// connection's slab index — both are plain `u64`s handed back by
/// `epoll_wait`, so they need a shared tag to route to `resume` versus
/// `resume_upstream`. A connection slab never holds anywhere near 2^32
/// entries, so the low 32 bits are never enough to collide with this tag.
const UPSTREAM_TOKEN_BIT: u64 = 1 << 32;

/// Drives a single listening socket with one OS thread, no worker pool:
/// every connection's read → parse → handle → write sequence is expressed
/// as a state machine resumed by readiness events instead of by blocking a
/// thread per connection. This is the idiomatic-Rust rendition of a
/// generator-based cooperative scheduler, per this crate's own design notes:
/// Rust has no general-purpose suspendable-computation primitive, so the
/// suspension points a generator would `yield` at become explicit
/// `ConnState` variants instead.
///
/// `StaticAsset`/`HealthCheck` answer from memory, so their `Handling` state
/// runs to completion inline without giving up the thread. `ReverseProxy`/
/// `LoadBalancer` tasks are themselves an outbound socket, so their
/// `Handling` state is its own nested state machine (`UpstreamStage`,
/// driven by `resume_upstream`) suspended on the upstream fd's readiness the
/// same way the client connection suspends on its own — no handler kind
/// blocks this thread on network I/O.
pub struct Scheduler {
    engine: Arc<MatchEngine<Handler>>,
    stats: Arc<Stats>,
    slab: ConnectionSlab,
    epoll: Epoll,
    listen_fd: c_int,
    upstreams: HashMap<usize, UpstreamConn>,
}

impl Scheduler {
    pub fn new(
        listen_fd: c_int,
        engine: Arc<MatchEngine<Handler>>,
        stats: Arc<Stats>,
        capacity: usize,
    ) -> std::io::Result<Self> {
        let epoll = Epoll::new().map_err(|_| std::io::Error::last_os_error())?;
        epoll
            .add(listen_fd, u64::MAX, EPOLLIN)
            .map_err(|_| std::io::Error::last_os_error())?;
        Ok(Self {
            engine,
            stats,
            slab: ConnectionSlab::new(capacity),
            epoll,
            listen_fd,
            upstreams: HashMap::new(),
        })
    }

    pub fn run(&mut self, shutdown: Arc<AtomicBool>) {
        let mut events = vec![epoll_event { events: 0, u64: 0 }; 1024];

        while !shutdown.load(Ordering::Acquire) {
            let n = match self.epoll.wait(&mut events, 200) {
                Ok(n) => n,
                Err(_) => continue,
            };

            for i in 0..n {
                let token = events[i].u64;
                if token == u64::MAX {
                    self.accept_ready();
                } else if token & UPSTREAM_TOKEN_BIT != 0 {
                    self.resume_upstream((token & !UPSTREAM_TOKEN_BIT) as usize);
                } else {
                    self.resume(token as usize);
                }
            }
        }

        for (_, upstream) in self.upstreams.drain() {
            syscalls::close_fd(upstream.fd);
        }
        for i in 0..self.slab.capacity() {
            if let Some(conn) = self.slab.get(i) {
                if conn.state != ConnState::Free {
                    syscalls::close_fd(conn.fd);
                }
            }
        }
        syscalls::close_fd(self.listen_fd);
    }

    fn accept_ready(&mut self) {
        loop {
            match syscalls::accept_connection(self.listen_fd) {
                Ok(Some(client_fd)) => match self.slab.allocate(client_fd) {
                    Some(idx) => {
                        if self.epoll.add(client_fd, idx as u64, EPOLLIN).is_err() {
                            self.slab.free(idx);
                            syscalls::close_fd(client_fd);
                        } else if let Some(conn) = self.slab.get_mut(idx) {
                            conn.state = ConnState::Reading;
                        }
                    }
                    None => syscalls::close_fd(client_fd),
                },
                Ok(None) => break,
                Err(_) => break,
            }
        }
    }

    /// Resume the state machine for the connection at `idx` after an I/O
    /// readiness notification. Runs the `Reading → Parsing → Handling →
    /// Writing` pipeline to its next suspension point or to completion. A
    /// fully-flushed write loops the connection back to `Reading` instead of
    /// closing it — the per-connection request loop keeps going until the
    /// client closes, goes idle, sends something malformed, or a write
    /// fails, exactly as `Dispatch::serve_once`'s callers in the other two
    /// strategies do.
    fn resume(&mut self, idx: usize) {
        let fd = match self.slab.get(idx) {
            Some(conn) => conn.fd,
            None => return,
        };

        if let Some(conn) = self.slab.get_mut(idx) {
            if conn.state == ConnState::Reading {
                match read_into(conn, fd) {
                    Ok(true) => conn.state = ConnState::Parsing,
                    Ok(false) => {
                        self.close(idx);
                        return;
                    }
                    Err(_) => {
                        self.close(idx);
                        return;
                    }
                }
            }
        }

        let parsed = if let Some(conn) = self.slab.get(idx) {
            if conn.state == ConnState::Parsing {
                Some(parser::parse_request(&conn.read_buf[..conn.parse_pos as usize]))
            } else {
                None
            }
        } else {
            None
        };

        if let Some(parsed) = parsed {
            self.stats.inc_requests_received();
            match parsed {
                Ok(request) => {
                    let engine = self.engine.clone();
                    match engine.dispatch(&request) {
                        Some(handler) => match handler.async_upstream() {
                            // StaticAsset/HealthCheck answer from memory; run
                            // them inline rather than through the upstream
                            // state machine built for the other two kinds.
                            None => {
                                let response = handler.handle_blocking(&request);
                                self.write_response(idx, fd, response.serialize());
                            }
                            Some(target) => {
                                self.start_upstream(idx, target, request.raw);
                            }
                        },
                        None => {
                            let response =
                                crate::http::Response::bad_request("no task matches this request");
                            self.write_response(idx, fd, response.serialize());
                        }
                    }
                }
                Err(_) => {
                    let response =
                        crate::http::Response::bad_request("malformed HTTP request");
                    self.write_response(idx, fd, response.serialize());
                }
            }
        }

        let should_close = if let Some(conn) = self.slab.get_mut(idx) {
            if conn.state == ConnState::Writing {
                let total = conn.parse_pos as usize;
                let from = conn.write_pos as usize;
                match syscalls::write_nonblocking(fd, &conn.write_buf[from..total]) {
                    Ok(written) => {
                        self.stats.add_bytes_sent(written);
                        conn.write_pos += written as u16;
                        if conn.write_pos as usize >= total {
                            self.stats.inc_responses_sent();
                            conn.requests_served += 1;
                            if conn.requests_served >= MAX_REQUESTS_PER_CONNECTION {
                                true
                            } else {
                                conn.state = ConnState::Reading;
                                conn.parse_pos = 0;
                                conn.write_pos = 0;
                                false
                            }
                        } else {
                            false
                        }
                    }
                    Err(_) => true,
                }
            } else {
                false
            }
        } else {
            false
        };

        if should_close {
            self.close(idx);
        } else if let Some(conn) = self.slab.get(idx) {
            if conn.state == ConnState::Reading {
                // Drop write-readiness interest now that the response is
                // fully flushed; wait for the next request instead.
                self.epoll.modify(fd, idx as u64, EPOLLIN).ok();
            }
        }
    }

    /// Copies a fully-built response into the connection's write buffer and
    /// arms epoll for the `Writing` state. Shared by the inline
    /// (`StaticAsset`/`HealthCheck`) and bad-request/malformed-request paths
    /// through `resume`.
    fn write_response(&mut self, idx: usize, fd: c_int, serialized: Vec<u8>) {
        if let Some(conn) = self.slab.get_mut(idx) {
            let len = serialized.len().min(conn.write_buf.len());
            conn.write_buf[..len].copy_from_slice(&serialized[..len]);
            conn.write_pos = 0;
            conn.parse_pos = len as u16;
            conn.state = ConnState::Writing;
        }
        self.epoll.modify(fd, idx as u64, EPOLLIN | EPOLLOUT).ok();
    }

    /// Begins the non-blocking upstream round trip for a `ReverseProxy`/
    /// `LoadBalancer` task: opens a non-blocking connect to `target` and
    /// parks the client connection in `Handling` while the upstream leg
    /// progresses through `resume_upstream`. The client fd is pulled out of
    /// epoll for the duration — nothing reads or writes it again until the
    /// upstream response is in hand.
    fn start_upstream(&mut self, idx: usize, target: FrontResult<Upstream>, request_raw: Vec<u8>) {
        let upstream = match target {
            Ok(u) => u,
            Err(_) => {
                self.close(idx);
                return;
            }
        };
        let client_fd = match self.slab.get(idx) {
            Some(conn) => conn.fd,
            None => return,
        };

        let upstream_fd = match syscalls::connect_nonblocking(&upstream.host, upstream.port) {
            Ok(fd) => fd,
            Err(_) => {
                self.close(idx);
                return;
            }
        };

        self.epoll.delete(client_fd).ok();
        if self
            .epoll
            .add(upstream_fd, idx as u64 | UPSTREAM_TOKEN_BIT, EPOLLOUT)
            .is_err()
        {
            syscalls::close_fd(upstream_fd);
            self.close(idx);
            return;
        }

        if let Some(conn) = self.slab.get_mut(idx) {
            conn.state = ConnState::Handling;
        }
        self.upstreams.insert(
            idx,
            UpstreamConn {
                fd: upstream_fd,
                stage: UpstreamStage::Connecting,
                request: request_raw,
                write_pos: 0,
                response: Vec::new(),
            },
        );
    }

    /// Resume an in-flight upstream round trip after a readiness
    /// notification on its own fd. `Connecting` and `Writing` both progress
    /// on write-readiness; `Reading` drains the upstream's response to EOF,
    /// looping within one notification since the upstream fd is registered
    /// edge-triggered.
    fn resume_upstream(&mut self, idx: usize) {
        let (fd, stage) = match self.upstreams.get(&idx) {
            Some(u) => (u.fd, u.stage),
            None => return,
        };

        match stage {
            UpstreamStage::Connecting => match syscalls::take_socket_error(fd) {
                Ok(()) => {
                    if let Some(u) = self.upstreams.get_mut(&idx) {
                        u.stage = UpstreamStage::Writing;
                    }
                    self.resume_upstream(idx);
                }
                Err(_) => self.abort_upstream(idx),
            },
            // Edge-triggered epoll only reports a new writable edge when the
            // socket transitions from full to not-full, so this has to drain
            // every byte it currently can in one pass rather than writing
            // once and waiting for a notification that might never come.
            UpstreamStage::Writing => loop {
                let (total, from) = match self.upstreams.get(&idx) {
                    Some(u) => (u.request.len(), u.write_pos),
                    None => return,
                };
                if from >= total {
                    if let Some(u) = self.upstreams.get_mut(&idx) {
                        u.stage = UpstreamStage::Reading;
                    }
                    self.epoll
                        .modify(fd, idx as u64 | UPSTREAM_TOKEN_BIT, EPOLLIN)
                        .ok();
                    return;
                }
                let result = {
                    let u = self.upstreams.get(&idx).unwrap();
                    syscalls::write_nonblocking(fd, &u.request[from..total])
                };
                match result {
                    Ok(0) => return, // would block; wait for the next writable event
                    Ok(written) => {
                        if let Some(u) = self.upstreams.get_mut(&idx) {
                            u.write_pos += written;
                        }
                    }
                    Err(_) => {
                        self.abort_upstream(idx);
                        return;
                    }
                }
            },
            UpstreamStage::Reading => loop {
                let mut buf = [0u8; 4096];
                match syscalls::read_nonblocking_detailed(fd, &mut buf) {
                    Ok(ReadOutcome::Read(n)) => {
                        if let Some(u) = self.upstreams.get_mut(&idx) {
                            u.response.extend_from_slice(&buf[..n]);
                        }
                    }
                    Ok(ReadOutcome::WouldBlock) => break,
                    Ok(ReadOutcome::Eof) => {
                        self.finish_upstream(idx);
                        break;
                    }
                    Err(_) => {
                        self.abort_upstream(idx);
                        break;
                    }
                }
            },
        }
    }

    /// The upstream's response arrived in full: hand it to the client
    /// connection as this request's response and re-arm epoll on the client
    /// fd so the connection's own `Writing`/next-`Reading` cycle resumes
    /// exactly as it would for an inline handler.
    fn finish_upstream(&mut self, idx: usize) {
        let Some(upstream) = self.upstreams.remove(&idx) else {
            return;
        };
        syscalls::close_fd(upstream.fd);

        let client_fd = match self.slab.get(idx) {
            Some(conn) => conn.fd,
            None => return,
        };
        self.write_response(idx, client_fd, upstream.response);
        if self
            .epoll
            .add(client_fd, idx as u64, EPOLLIN | EPOLLOUT)
            .is_err()
        {
            self.close(idx);
        }
    }

    /// Upstream connect/write/read failed: per this crate's upstream-failure
    /// contract, that closes the client connection silently rather than
    /// synthesizing a diagnostic response.
    fn abort_upstream(&mut self, idx: usize) {
        if let Some(upstream) = self.upstreams.remove(&idx) {
            syscalls::close_fd(upstream.fd);
        }
        self.close(idx);
    }

    fn close(&mut self, idx: usize) {
        if let Some(upstream) = self.upstreams.remove(&idx) {
            syscalls::close_fd(upstream.fd);
        }
        if let Some(conn) = self.slab.get(idx) {
            self.epoll.delete(conn.fd).ok();
            syscalls::close_fd(conn.fd);
        }
        self.slab.free(idx);
    }
}

/// Reads whatever is available into `conn.read_buf`. Returns `Ok(false)` on
/// a clean EOF (client closed), `Ok(true)` once at least one byte has been
/// read (the whole request is assumed to have arrived in this one readiness
/// notification, per this crate's single-shot request model).
fn read_into(conn: &mut Conn, fd: c_int) -> std::io::Result<bool> {
    let pos = conn.parse_pos as usize;
    if pos >= READ_BUF_SIZE {
        return Ok(false);
    }
    let n = syscalls::read_nonblocking(fd, &mut conn.read_buf[pos..])
        .map_err(|_| std::io::Error::last_os_error())?;
    if n == 0 && pos == 0 {
        return Ok(false);
    }
    conn.parse_pos += n as u16;
    Ok(n > 0 || pos > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_task_identifies_the_fd_it_waits_on() {
        let task = ResourceTask::Readable(7);
        assert_eq!(task, ResourceTask::Readable(7));
        assert_ne!(task, ResourceTask::Writable(7));
    }
}
