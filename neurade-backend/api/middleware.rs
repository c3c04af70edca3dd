use std::time::Instant;

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::Instrument;

/// Run the request inside a `request` span and log its status on the way out.
pub async fn trace_request(req: Request<Body>, next: Next) -> Response {
    let span = tracing::info_span!("request", method = %req.method(), path = %req.uri().path());
    async move {
        let started = Instant::now();
        let response = next.run(req).await;
        tracing::debug!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Permanently redirect `/path/` to `/path`. The root path is left alone.
pub async fn strip_trailing_slash(req: Request<Body>, next: Next) -> Response {
    let uri = req.uri();

    match uri.path().strip_suffix('/').filter(|p| !p.is_empty()) {
        Some(path) => {
            let location = match uri.query() {
                Some(query) => format!("{path}?{query}"),
                None => path.to_string(),
            };
            Redirect::permanent(&location).into_response()
        }
        None => next.run(req).await,
    }
}
