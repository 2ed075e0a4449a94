use crate::http::{Headers, Method, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The first line had fewer than two whitespace-separated tokens, a
    /// header line had no `: `, or the buffer was not valid UTF-8.
    NotValidHttp,
}

/// Parses a byte buffer (up to 16 KiB, representing a single HTTP/1.1
/// request) into a [`Request`]. Deliberately minimal: the hard engineering
/// in this crate is the orchestration around this call, not the parsing.
pub fn parse_request(buf: &[u8]) -> Result<Request, ParseError> {
    let text = std::str::from_utf8(buf).map_err(|_| ParseError::NotValidHttp)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::NotValidHttp)?;
    let mut tokens = request_line.split_whitespace();
    let method = tokens.next().ok_or(ParseError::NotValidHttp)?;
    let url = tokens.next().ok_or(ParseError::NotValidHttp)?;

    let mut headers = Headers::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut past_headers = false;

    for line in lines {
        if past_headers {
            body_lines.push(line);
            continue;
        }
        if line.is_empty() {
            past_headers = true;
            continue;
        }
        let (name, value) = line.split_once(": ").ok_or(ParseError::NotValidHttp)?;
        headers.insert(name.to_string(), value.to_string());
    }

    let (host, port) = match headers.get("Host") {
        Some(host_header) => match host_header.split_once(':') {
            Some((h, p)) => (h.to_string(), p.to_string()),
            None => (host_header.clone(), String::new()),
        },
        None => (String::new(), String::new()),
    };

    let body = body_lines.join("\r\n").into_bytes();

    Ok(Request {
        method: Method::parse(method),
        url: url.to_string(),
        headers,
        host,
        port,
        body,
        raw: buf.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_request() {
        let raw = b"GET /static/a.css HTTP/1.1\r\nHost: x:9999\r\nKeep-Alive: true\r\n\r\n";
        let req = parse_request(raw).unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.url, "/static/a.css");
        assert_eq!(req.host, "x");
        assert_eq!(req.port, "9999");
        assert_eq!(req.headers.get("Keep-Alive").unwrap(), "true");
        assert!(req.body.is_empty());
    }

    #[test]
    fn parses_body_after_blank_line() {
        let raw = b"POST /submit HTTP/1.1\r\nHost: x:9999\r\n\r\nname=value";
        let req = parse_request(raw).unwrap();
        assert_eq!(req.body, b"name=value");
    }

    #[test]
    fn missing_host_header_yields_empty_host_and_port() {
        let raw = b"GET / HTTP/1.1\r\n\r\n";
        let req = parse_request(raw).unwrap();
        assert_eq!(req.host, "");
        assert_eq!(req.port, "");
    }

    #[test]
    fn rejects_request_line_with_one_token() {
        let raw = b"GET\r\nHost: x\r\n\r\n";
        assert_eq!(parse_request(raw), Err(ParseError::NotValidHttp));
    }

    #[test]
    fn rejects_header_without_colon_space() {
        let raw = b"GET / HTTP/1.1\r\nHost x\r\n\r\n";
        assert_eq!(parse_request(raw), Err(ParseError::NotValidHttp));
    }

    #[test]
    fn rejects_non_utf8() {
        let raw = b"GET / HTTP/1.1\r\nHost: \xFF\xFE\r\n\r\n";
        assert_eq!(parse_request(raw), Err(ParseError::NotValidHttp));
    }

    #[test]
    fn idempotent_parse() {
        let raw = b"GET /a HTTP/1.1\r\nHost: x:1\r\n\r\nbody";
        let a = parse_request(raw).unwrap();
        let b = parse_request(raw).unwrap();
        assert_eq!(a.url, b.url);
        assert_eq!(a.host, b.host);
        assert_eq!(a.headers, b.headers);
        assert_eq!(a.body, b.body);
    }
}
