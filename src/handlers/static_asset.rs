use crate::error::FrontResult;
use crate::http::{Request, Response};
use indexmap::IndexMap;
use std::path::Path;

const MIME_TABLE: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("txt", "text/plain"),
    ("mp4", "video/mp4"),
    ("flv", "video/x-flv"),
    ("m3u8", "application/x-mpegURL"),
    ("ts", "video/MP2T"),
    ("3gp", "video/3gpp"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("wmv", "video/x-ms-wmv"),
];

fn mime_for(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    MIME_TABLE
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or("text/html")
}

/// Serves files from a pre-enumerated in-memory cache built once at
/// construction. The request's URL has `strip_prefix` removed before it is
/// looked up; a miss serves a 404 naming the absolute path that was checked,
/// matching the diagnostic shape of the original handler this is grounded in.
pub struct StaticAssetHandler {
    root: std::path::PathBuf,
    strip_prefix: String,
    files: IndexMap<String, Vec<u8>>,
}

impl StaticAssetHandler {
    pub fn new(root: &str, strip_prefix: &str) -> FrontResult<Self> {
        let root = std::path::PathBuf::from(root);
        let mut files = IndexMap::new();
        if root.is_dir() {
            walk(&root, &root, &mut files)?;
        }
        Ok(Self {
            root,
            strip_prefix: strip_prefix.to_string(),
            files,
        })
    }

    pub fn handle(&self, request: &Request) -> Response {
        let relative = request
            .url
            .strip_prefix(self.strip_prefix.as_str())
            .unwrap_or(request.url.as_str());

        match self.files.get(relative) {
            Some(body) => Response::new(200, body.clone()).with_content_type(mime_for(relative)),
            None => {
                let absolute = self.root.join(relative);
                Response::not_found(format!("no such file: {}", absolute.display()))
            }
        }
    }
}

fn walk(
    root: &Path,
    dir: &Path,
    files: &mut IndexMap<String, Vec<u8>>,
) -> FrontResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, files)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let body = std::fs::read(&path)?;
            files.insert(relative, body);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Headers, Method};

    fn req(url: &str) -> Request {
        Request {
            method: Method::Get,
            url: url.to_string(),
            headers: Headers::new(),
            host: String::new(),
            port: String::new(),
            body: Vec::new(),
            raw: Vec::new(),
        }
    }

    #[test]
    fn serves_a_cached_file_with_inferred_mime() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("style.css"), b"body{}").unwrap();
        let handler = StaticAssetHandler::new(dir.path().to_str().unwrap(), "/static/").unwrap();

        let resp = handler.handle(&req("/static/style.css"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"body{}");
        assert_eq!(resp.headers.get("Content-Type").unwrap(), "text/css");
    }

    #[test]
    fn missing_file_yields_404_naming_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let handler = StaticAssetHandler::new(dir.path().to_str().unwrap(), "/static/").unwrap();

        let resp = handler.handle(&req("/static/missing.css"));
        assert_eq!(resp.status, 404);
        let body = String::from_utf8(resp.body).unwrap();
        assert!(body.contains("missing.css"));
    }

    #[test]
    fn finds_files_in_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img").join("logo.png"), b"\x89PNG").unwrap();
        let handler = StaticAssetHandler::new(dir.path().to_str().unwrap(), "/static/").unwrap();

        let resp = handler.handle(&req("/static/img/logo.png"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.headers.get("Content-Type").unwrap(), "image/png");
    }
}
