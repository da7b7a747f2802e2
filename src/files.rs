//! Static file serving from the webroot.
//!
//! Paths are resolved with real-path resolution; anything that escapes the
//! webroot is a 404, same as a missing file, so probes learn nothing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::StaticFilesConfig;
use crate::http::conditional::format_http_date;
use crate::http::mime;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder};

const CACHE_CONTROL: &str = "private, max-age=3600";

pub struct StaticFiles {
    root: PathBuf,
    index: String,
}

impl StaticFiles {
    pub fn new(config: &StaticFilesConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root),
            index: config.index.clone(),
        }
    }

    /// Serves the file the request path points at inside the webroot.
    ///
    /// Directories resolve to their index file. Traversal attempts, missing
    /// files and unreadable files all come back as 404.
    pub async fn serve(&self, req: &Request) -> Response {
        match self.resolve(&req.path).await {
            Some(path) => self.serve_file(&path).await,
            None => Response::status(404),
        }
    }

    /// Resolves a request path to a real filesystem path under the root.
    async fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let root = tokio::fs::canonicalize(&self.root).await.ok()?;

        let relative = request_path.trim_start_matches('/');
        let mut path = tokio::fs::canonicalize(root.join(relative)).await.ok()?;

        // The resolved path must be the root itself or a true descendant.
        if !path.starts_with(&root) {
            tracing::warn!(path = %request_path, "path traversal attempt rejected");
            return None;
        }

        if tokio::fs::metadata(&path).await.ok()?.is_dir() {
            path = tokio::fs::canonicalize(path.join(&self.index)).await.ok()?;
            if !path.starts_with(&root) {
                return None;
            }
        }

        Some(path)
    }

    async fn serve_file(&self, path: &Path) -> Response {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            _ => return Response::status(404),
        };

        let contents = match tokio::fs::read(path).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "file read failed");
                return Response::status(404);
            }
        };

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&contents);
        let etag = format!("\"{:08x}\"", hasher.finalize());

        let mut builder = ResponseBuilder::new(200)
            .header("Content-Type", mime::from_path(path))
            .header("ETag", etag)
            .header("Cache-Control", CACHE_CONTROL);

        if let Ok(modified) = metadata.modified() {
            let modified: DateTime<Utc> = modified.into();
            builder = builder.header("Last-Modified", format_http_date(modified));
        }

        builder.body(contents).build()
    }
}
