//! Frontend hosting with SPA fallback
//!
//! Resolution order: an external directory from `FRONTEND_DIR` when it
//! exists, else the embedded asset tree, else a built-in placeholder
//! page. Unknown paths rewrite to `index.html` so client-side routing
//! works. Hashed assets get a year of caching, HTML none.

use std::path::{Path, PathBuf};

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use include_dir::{include_dir, Dir};
use tracing::{debug, warn};

static EMBEDDED: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/frontend");

const PLACEHOLDER_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>chuan</title>
</head>
<body>
    <h1>chuan rendezvous server</h1>
    <p>No frontend build is available. The API is live:</p>
    <ul>
        <li><code>POST /api/create-room</code></li>
        <li><code>GET /api/room-info?code=...</code></li>
        <li><code>WS /api/ws/webrtc?code=...&amp;role=...</code></li>
    </ul>
    <p>Set <code>FRONTEND_DIR</code> to serve a built frontend.</p>
</body>
</html>
"#;

/// Where static files come from
pub enum FrontendHandler {
    /// External directory, canonicalized at startup
    External { base: PathBuf },
    /// Assets compiled into the binary
    Embedded,
    /// Nothing available; serve the placeholder page
    Placeholder,
}

impl FrontendHandler {
    pub fn from_config(frontend_dir: Option<&Path>) -> Self {
        if let Some(dir) = frontend_dir {
            match dir.canonicalize() {
                Ok(base) if base.is_dir() => return FrontendHandler::External { base },
                _ => warn!(?dir, "frontend directory not usable, falling back"),
            }
        }

        if EMBEDDED.get_file("index.html").is_some() {
            FrontendHandler::Embedded
        } else {
            FrontendHandler::Placeholder
        }
    }

    /// Serve one request path
    pub async fn serve(&self, path: &str) -> Response {
        let rel = normalize(path);
        match self {
            FrontendHandler::External { base } => serve_external(base, &rel).await,
            FrontendHandler::Embedded => serve_embedded(&rel),
            FrontendHandler::Placeholder => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
                    (header::CACHE_CONTROL, "no-cache".to_string()),
                ],
                PLACEHOLDER_HTML,
            )
                .into_response(),
        }
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        "index.html".to_string()
    } else {
        trimmed.to_string()
    }
}

async fn serve_external(base: &Path, rel: &str) -> Response {
    let full = base.join(rel);

    match full.canonicalize() {
        Ok(resolved) if !resolved.starts_with(base) => {
            debug!(?resolved, "path escapes frontend directory");
            StatusCode::FORBIDDEN.into_response()
        }
        Ok(resolved) if resolved.is_file() => serve_disk_file(&resolved, rel).await,
        // Missing file or a directory: SPA rewrite to index.html.
        _ => {
            let index = base.join("index.html");
            if index.is_file() {
                serve_disk_file(&index, "index.html").await
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }
    }
}

async fn serve_disk_file(path: &Path, rel: &str) -> Response {
    match tokio::fs::read(path).await {
        Ok(contents) => file_response(rel, contents),
        Err(e) => {
            warn!(?path, error = %e, "failed to read frontend file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn serve_embedded(rel: &str) -> Response {
    if let Some(file) = EMBEDDED.get_file(rel) {
        return file_response(rel, file.contents().to_vec());
    }

    // Directory request or unknown route: SPA rewrite.
    let dir_index = format!("{}/index.html", rel.trim_end_matches('/'));
    if let Some(file) = EMBEDDED.get_file(&dir_index) {
        return file_response("index.html", file.contents().to_vec());
    }
    match EMBEDDED.get_file("index.html") {
        Some(file) => file_response("index.html", file.contents().to_vec()),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn file_response(rel: &str, contents: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type(rel)),
            (header::CACHE_CONTROL, cache_control(rel).to_string()),
        ],
        contents,
    )
        .into_response()
}

fn content_type(rel: &str) -> String {
    let mime = mime_guess::from_path(rel).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT
        || mime == mime_guess::mime::APPLICATION_JAVASCRIPT
        || mime == mime_guess::mime::APPLICATION_JSON
    {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

/// Hashed build assets are immutable; HTML must revalidate.
fn cache_control(rel: &str) -> &'static str {
    let ext = Path::new(rel)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    match ext {
        "css" | "js" | "png" | "jpg" | "jpeg" | "gif" | "svg" | "ico" | "woff" | "woff2"
        | "ttf" => "public, max-age=31536000",
        _ => "no-cache",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn temp_site(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chuan-frontend-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("site/assets")).unwrap();
        std::fs::write(dir.join("site/index.html"), "<html>site index</html>").unwrap();
        std::fs::write(dir.join("site/assets/app.js"), "console.log(1)").unwrap();
        std::fs::write(dir.join("secret.txt"), "keep out").unwrap();
        dir
    }

    #[test]
    fn test_cache_control_mapping() {
        assert_eq!(cache_control("assets/app.1a2b.js"), "public, max-age=31536000");
        assert_eq!(cache_control("logo.svg"), "public, max-age=31536000");
        assert_eq!(cache_control("index.html"), "no-cache");
        assert_eq!(cache_control("manifest.webmanifest"), "no-cache");
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type("logo.png"), "image/png");
        assert!(content_type("app.js").contains("javascript"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/"), "index.html");
        assert_eq!(normalize(""), "index.html");
        assert_eq!(normalize("/assets/app.js"), "assets/app.js");
    }

    #[tokio::test]
    async fn test_external_serves_files_and_spa_fallback() {
        let dir = temp_site("serve");
        let handler = FrontendHandler::from_config(Some(&dir.join("site")));

        let response = handler.serve("/assets/app.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "console.log(1)");

        // Unknown route rewrites to index.html.
        let response = handler.serve("/rooms/A2B3C4").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "<html>site index</html>");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_external_blocks_traversal() {
        let dir = temp_site("traversal");
        let handler = FrontendHandler::from_config(Some(&dir.join("site")));

        let response = handler.serve("/../secret.txt").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_missing_external_falls_back_to_embedded() {
        let handler = FrontendHandler::from_config(Some(Path::new("/nonexistent/frontend")));
        assert!(matches!(handler, FrontendHandler::Embedded));

        let response = handler.serve("/").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_embedded_spa_fallback() {
        let handler = FrontendHandler::Embedded;
        let response = handler.serve("/some/client/route").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("<html"));
    }
}
