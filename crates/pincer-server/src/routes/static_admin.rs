//! Minimal placeholder markup for the two browser-facing admin pages. The
//! real console is a separate frontend; these two routes exist so that
//! hitting the server directly in a browser doesn't 404.

use axum::response::Html;

const SHELL: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Pincer admin</title></head>
<body>
<p>Pincer admin console. Point your frontend build at this origin's
<code>/v1/admin/*</code> API.</p>
</body>
</html>"#;

/// `GET /admin`.
pub async fn console() -> Html<&'static str> {
    Html(SHELL)
}

/// `GET /admin/bootstrap`.
pub async fn bootstrap_page() -> Html<&'static str> {
    Html(SHELL)
}
