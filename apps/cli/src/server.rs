//! HTTP adapter: mounts a [`Content`] surface on an axum router.
//!
//! Layers (outermost first): gzip, global headers, request log, handlers.
//! Every request falls through to the content handler, which runs the
//! blocking resolve-and-compile on tokio's blocking pool and buffers the
//! body, so a failed compile becomes a clean 500.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED, LOCATION};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, eyre};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tower_http::compression::CompressionLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info};

use kiln_core::{BufferedResponse, Content, Rebuild, ServeOutcome, ServeRequest, SilentProgress};
use kiln_shared::ServerConfig;

const HTML: &str = "text/html; charset=utf-8";

/// Bytes escaped when a decoded path goes back into a `Location` header.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Router settings taken from `[server]` plus CLI overrides.
#[derive(Debug, Clone)]
pub(crate) struct ServerOptions {
    pub prefix: String,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub not_found_page: Option<PathBuf>,
    pub gzip: bool,
    pub rebuild_path: String,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let headers = config
            .headers
            .iter()
            .map(|(name, value)| {
                let name = HeaderName::try_from(name.as_str())
                    .map_err(|e| eyre!("bad header name {name:?}: {e}"))?;
                let value = HeaderValue::try_from(value.as_str())
                    .map_err(|e| eyre!("bad value for header {name}: {e}"))?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prefix: config.prefix.clone(),
            headers,
            not_found_page: config.not_found_page.as_ref().map(PathBuf::from),
            gzip: config.gzip,
            rebuild_path: config.rebuild_path.clone(),
        })
    }
}

#[derive(Clone)]
struct AppState {
    content: Arc<Content>,
    prefix: Arc<str>,
    not_found_page: Option<Arc<PathBuf>>,
    rebuild: Option<Rebuild>,
}

/// Build the router. The rebuild route exists only when `rebuild` is given.
pub(crate) fn router(
    content: Arc<Content>,
    rebuild: Option<Rebuild>,
    options: &ServerOptions,
) -> Router {
    let has_rebuild = rebuild.is_some();
    let state = AppState {
        content,
        prefix: Arc::from(options.prefix.as_str()),
        not_found_page: options.not_found_page.clone().map(Arc::new),
        rebuild,
    };

    let mut app = Router::new();
    if has_rebuild {
        app = app.route(&options.rebuild_path, post(rebuild_handler));
    }
    let mut app: Router = app
        .fallback(serve_content)
        .with_state(state)
        .layer(middleware::from_fn(log_requests));

    for (name, value) in &options.headers {
        app = app.layer(SetResponseHeaderLayer::overriding(
            name.clone(),
            value.clone(),
        ));
    }
    if options.gzip {
        app = app.layer(CompressionLayer::new());
    }
    app
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn serve_content(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let path = match percent_decode_str(uri.path()).decode_utf8() {
        Ok(path) => path.into_owned(),
        Err(_) => return (StatusCode::BAD_REQUEST, "request path is not UTF-8\n").into_response(),
    };
    let since = headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);

    let content = Arc::clone(&state.content);
    let prefix = Arc::clone(&state.prefix);
    let request_path = path.clone();
    let served = tokio::task::spawn_blocking(move || {
        let req = ServeRequest {
            prefix: &prefix,
            path: &request_path,
            if_modified_since: since,
        };
        let mut resp = BufferedResponse::default();
        content.serve(&req, &mut resp).map(|outcome| (outcome, resp))
    })
    .await;

    match served {
        Ok(Ok((outcome, resp))) => respond(outcome, resp, &state).await,
        Ok(Err(err)) => {
            error!(class = %err.class(), error = %err, %path, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error\n").into_response()
        }
        Err(err) => {
            error!(error = %err, %path, "serve task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn respond(outcome: ServeOutcome, resp: BufferedResponse, state: &AppState) -> Response {
    match outcome {
        ServeOutcome::Served => {
            let mut builder = Response::builder().status(StatusCode::OK);
            if let Some(content_type) = &resp.content_type {
                builder = builder.header(CONTENT_TYPE, content_type);
            }
            if let Some(modified) = resp.last_modified {
                builder = builder.header(LAST_MODIFIED, format_http_date(modified));
            }
            builder
                .body(Body::from(resp.body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        ServeOutcome::NotModified => StatusCode::NOT_MODIFIED.into_response(),
        ServeOutcome::Redirect(location) => {
            let location = utf8_percent_encode(&location, PATH).to_string();
            (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response()
        }
        ServeOutcome::NotFound => not_found(state).await,
    }
}

async fn not_found(state: &AppState) -> Response {
    if let Some(page) = &state.not_found_page {
        match tokio::fs::read(page.as_path()).await {
            Ok(body) => return (StatusCode::NOT_FOUND, [(CONTENT_TYPE, HTML)], body).into_response(),
            Err(err) => error!(page = %page.display(), error = %err, "cannot read not-found page"),
        }
    }
    (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
}

async fn rebuild_handler(State(state): State<AppState>) -> Response {
    let Some(rebuild) = state.rebuild.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::task::spawn_blocking(move || rebuild.run(&SilentProgress)).await {
        Ok(Ok(report)) => {
            info!(
                compiled = report.compiled,
                copied = report.copied,
                "rebuild complete"
            );
            format!(
                "compiled {} copied {} skipped {} in {:.2}s\n",
                report.compiled,
                report.copied,
                report.skipped,
                report.elapsed.as_secs_f64()
            )
            .into_response()
        }
        Ok(Err(err)) => {
            error!(class = %err.class(), error = %err, "rebuild failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("rebuild failed: {err}\n")).into_response()
        }
        Err(err) => {
            error!(error = %err, "rebuild task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Log status and URI of every request.
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    info!(
        status = response.status().as_u16(),
        %method,
        %uri,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

// ---------------------------------------------------------------------------
// HTTP dates
// ---------------------------------------------------------------------------

pub(crate) fn format_http_date(at: SystemTime) -> String {
    DateTime::<Utc>::from(at)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

pub(crate) fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| SystemTime::from(d.with_timezone(&Utc)))
}
