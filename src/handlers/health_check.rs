use crate::http::{Request, Response};

/// Always answers `200 I'm Healthy!`, regardless of the request.
pub struct HealthCheckHandler;

impl HealthCheckHandler {
    pub fn handle(&self, _request: &Request) -> Response {
        Response::new(200, b"I'm Healthy!".to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Headers, Method};

    #[test]
    fn always_reports_healthy() {
        let handler = HealthCheckHandler;
        let req = Request {
            method: Method::Get,
            url: "/whatever".to_string(),
            headers: Headers::new(),
            host: String::new(),
            port: String::new(),
            body: Vec::new(),
            raw: Vec::new(),
        };
        let resp = handler.handle(&req);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"I'm Healthy!");
    }
}
