pub mod cooperative;
pub mod thread_per_client;
pub mod thread_per_request;

use crate::conn::READ_BUF_SIZE;
use crate::error::{FrontError, FrontResult};
use crate::handlers::Handler;
use crate::http::Response;
use crate::match_engine::MatchEngine;
use crate::parser;
use crate::stats::Stats;
use libc::c_int;
use std::sync::Arc;

/// Everything a strategy needs to answer one request on one connection,
/// shared read-only across every worker regardless of which strategy drives
/// them.
pub struct Dispatch {
    pub engine: Arc<MatchEngine<Handler>>,
    pub stats: Arc<Stats>,
}

/// Hard cap on requests served over one kept-alive connection before a
/// strategy closes it regardless of idle timeout, so a single long-lived
/// client can't pin a thread or connection slot forever.
pub const MAX_REQUESTS_PER_CONNECTION: u32 = 10_000;

impl Dispatch {
    /// One full request/response cycle over an already-accepted socket: read
    /// once (the whole request is assumed to arrive in one buffer, per this
    /// crate's single-shot request model), parse, dispatch, write. Callers
    /// loop this for the life of the connection — each call answers exactly
    /// one request and reports whether the connection is still good for
    /// another. Returns `Ok(false)` on a client-initiated close or a
    /// malformed request (diagnostic already written), which callers treat as
    /// "nothing more to do, close quietly".
    pub fn serve_once(&self, fd: c_int) -> FrontResult<bool> {
        let mut buf = [0u8; READ_BUF_SIZE];
        let n = crate::syscalls::read_nonblocking(fd, &mut buf)?;
        if n == 0 {
            return Ok(false); // ClientClosingConnection
        }
        self.stats.add_bytes_received(n);

        let request = match parser::parse_request(&buf[..n]) {
            Ok(req) => req,
            Err(_) => {
                let resp = Response::bad_request("malformed HTTP request");
                send_all(fd, &resp.serialize())?;
                return Ok(false); // NotValidHttp: diagnostic, then close
            }
        };
        self.stats.inc_requests_received();

        let response = match self.engine.dispatch(&request) {
            Some(handler) => handler.handle_blocking(&request),
            None => Response::bad_request("no task matches this request"),
        };

        let bytes = response.serialize();
        send_all(fd, &bytes)?;
        self.stats.add_bytes_sent(bytes.len());
        self.stats.inc_responses_sent();
        Ok(true)
    }
}

/// Write a full buffer to a socket, retrying on partial writes. `fd` may be
/// blocking (thread-per-client) or non-blocking (thread-per-request, where a
/// `WouldBlock` is reported back to the caller as zero bytes written and the
/// caller is expected to re-poll).
pub fn send_all(fd: c_int, mut buf: &[u8]) -> FrontResult<()> {
    while !buf.is_empty() {
        let n = crate::syscalls::write_nonblocking(fd, buf)?;
        if n == 0 {
            return Err(FrontError::Other("write stalled (socket reported WouldBlock)".into()));
        }
        buf = &buf[n..];
    }
    Ok(())
}
