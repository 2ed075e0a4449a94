use crate::config::Upstream;
use crate::http::{Request, Response};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(15);

/// Forwards a request's raw bytes to a single fixed upstream and relays its
/// response back verbatim. Any failure reaching the upstream silently closes
/// the client connection rather than synthesizing a 502 — per this crate's
/// error-handling contract, an upstream failure is the upstream's problem,
/// not something this front-end narrates to the client.
pub struct ReverseProxyHandler {
    upstream: Upstream,
}

impl ReverseProxyHandler {
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }

    pub(super) fn upstream(&self) -> Upstream {
        self.upstream.clone()
    }

    pub fn handle_blocking(&self, request: &Request) -> Response {
        match forward(&self.upstream, request) {
            Ok(raw) => Response::from_raw(raw),
            Err(_) => Response::from_raw(Vec::new()),
        }
    }
}

pub(super) fn forward(upstream: &Upstream, request: &Request) -> std::io::Result<Vec<u8>> {
    let addr = (upstream.host.as_str(), upstream.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "upstream host resolved to no address")
        })?;
    let mut stream = TcpStream::connect_timeout(&addr, UPSTREAM_TIMEOUT)?;
    stream.set_read_timeout(Some(UPSTREAM_TIMEOUT))?;
    stream.set_write_timeout(Some(UPSTREAM_TIMEOUT))?;
    stream.write_all(&request.raw)?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn forwards_request_bytes_and_relays_response_verbatim() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
            let mut first_line = String::new();
            reader.read_line(&mut first_line).unwrap();
            assert_eq!(first_line, "GET /upstream HTTP/1.1\r\n");
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi")
                .unwrap();
        });

        let upstream = Upstream {
            host: addr.ip().to_string(),
            port: addr.port(),
            weight: None,
        };
        let raw = forward(
            &upstream,
            &crate::http::Request {
                method: crate::http::Method::Get,
                url: "/upstream".to_string(),
                headers: crate::http::Headers::new(),
                host: String::new(),
                port: String::new(),
                body: Vec::new(),
                raw: b"GET /upstream HTTP/1.1\r\n\r\n".to_vec(),
            },
        )
        .unwrap();

        assert_eq!(raw, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi");
        handle.join().unwrap();
    }

    #[test]
    fn unreachable_upstream_is_an_error_not_a_panic() {
        let upstream = Upstream {
            host: "127.0.0.1".to_string(),
            port: 1,
            weight: None,
        };
        let result = forward(
            &upstream,
            &crate::http::Request {
                method: crate::http::Method::Get,
                url: "/".to_string(),
                headers: crate::http::Headers::new(),
                host: String::new(),
                port: String::new(),
                body: Vec::new(),
                raw: b"GET / HTTP/1.1\r\n\r\n".to_vec(),
            },
        );
        assert!(result.is_err());
    }
}
