use indexmap::IndexMap;

/// HTTP request method. Unrecognized verbs are kept verbatim so the wire codec
/// never has to reject a request merely because its method is unusual.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
    Connect,
    Other(String),
}

impl Method {
    pub fn parse(s: &str) -> Self {
        match s {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Other(s) => s.as_str(),
        }
    }
}

/// An ordered header map. Headers keep the order they were parsed in, and a
/// repeated header name overwrites the earlier value.
pub type Headers = IndexMap<String, String>;

/// A parsed HTTP/1.1 request. Immutable after [`crate::parser::parse_request`]
/// builds it. `host` and `port` are extracted from the `Host` header once, up
/// front, since the match engine and several handlers need them on every
/// request and re-splitting `Host` at each use would be wasted work.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub host: String,
    pub port: String,
    pub body: Vec<u8>,
    pub raw: Vec<u8>,
}

impl Request {
    /// Look up one of the attributes a [`crate::match_engine::MatchCriteria`]
    /// can name: `url`, `host`, `port`, or any header name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "url" => Some(self.url.as_str()),
            "host" => Some(self.host.as_str()),
            "port" => Some(self.port.as_str()),
            header => self.headers.get(header).map(String::as_str),
        }
    }
}

/// An HTTP/1.1 response. When `raw` is set (the reverse-proxy and
/// load-balance handlers populate it with the upstream's exact bytes)
/// [`Response::serialize`] returns it unchanged instead of rebuilding a
/// status line from `status`/`headers`/`body`.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub raw: Option<Vec<u8>>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "text/html".to_string());
        headers.insert("Content-Length".to_string(), body.len().to_string());
        Self {
            status,
            headers,
            body,
            raw: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.headers
            .insert("Content-Type".to_string(), content_type.into());
        self
    }

    /// Wrap an upstream's exact response bytes. `serialize` returns them verbatim.
    pub fn from_raw(raw: Vec<u8>) -> Self {
        Self {
            status: 0,
            headers: Headers::new(),
            body: Vec::new(),
            raw: Some(raw),
        }
    }

    pub fn bad_request(diagnostic: impl Into<String>) -> Self {
        Self::new(400, diagnostic.into().into_bytes())
    }

    pub fn not_found(diagnostic: impl Into<String>) -> Self {
        Self::new(404, diagnostic.into().into_bytes())
    }

    /// Serialize to `HTTP/1.1 <code>\r\n<headers>\r\n\r\n<body>`, or return
    /// the preserved raw upstream bytes unchanged.
    pub fn serialize(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }

        let mut out = Vec::with_capacity(self.body.len() + 128);
        out.extend_from_slice(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_roundtrips_known_verbs() {
        assert_eq!(Method::parse("GET"), Method::Get);
        assert!(matches!(Method::parse("FROBNICATE"), Method::Other(ref s) if s == "FROBNICATE"));
    }

    #[test]
    fn serialize_rebuilds_status_line_and_headers() {
        let resp = Response::new(200, b"hi".to_vec());
        let bytes = resp.serialize();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200\r\n"));
        assert!(text.contains("Content-Length: 2"));
        assert!(text.ends_with("\r\n\r\nhi"));
    }

    #[test]
    fn serialize_returns_raw_verbatim() {
        let resp = Response::from_raw(b"HTTP/1.1 201 Created\r\n\r\nbody".to_vec());
        assert_eq!(resp.serialize(), b"HTTP/1.1 201 Created\r\n\r\nbody");
    }
}
