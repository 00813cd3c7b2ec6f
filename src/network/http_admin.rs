use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::{self, HeaderValue};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::network::metrics;
use crate::sync::{ControlError, SyncOrchestrator};

const DASHBOARD_HTML: &str = include_str!("../../static/index.html");
const DASHBOARD_JS: &str = include_str!("../../static/script.js");

/// Bearer tokens accepted by the control API. With neither set, every
/// request is allowed.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    pub admin_token: Option<String>,
    pub readonly_token: Option<String>,
}

impl From<&ServerConfig> for AccessPolicy {
    fn from(server: &ServerConfig) -> Self {
        Self {
            admin_token: server.admin_token.clone(),
            readonly_token: server.readonly_token.clone(),
        }
    }
}

/// Serve the control API until `shutdown` is cancelled.
pub async fn run_http_admin(
    addr: SocketAddr,
    orchestrator: Arc<SyncOrchestrator>,
    access: AccessPolicy,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    let access = Arc::new(access);

    let make_svc = make_service_fn(move |_conn| {
        let orchestrator = Arc::clone(&orchestrator);
        let access = Arc::clone(&access);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let orchestrator = Arc::clone(&orchestrator);
                let access = Arc::clone(&access);
                async move { handle(req, orchestrator, access).await }
            }))
        }
    });

    let server = hyper::Server::try_bind(&addr)?.serve(make_svc);
    log::info!("Control API listening on http://{}", server.local_addr());
    server
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    let mut resp = Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

fn json_error(status: StatusCode, msg: &str) -> Response<Body> {
    json_response(status, json!({ "error": msg }))
}

fn static_response(body: &'static str, content_type: &'static str) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

/// Dashboard assets carry no state and are served without a token; the
/// page sends the token itself on every API call.
fn dashboard_asset(method: &Method, path: &str) -> Option<Response<Body>> {
    if *method != Method::GET {
        return None;
    }
    match path {
        "/" | "/index.html" => Some(static_response(DASHBOARD_HTML, "text/html; charset=utf-8")),
        "/static/script.js" => Some(static_response(
            DASHBOARD_JS,
            "application/javascript; charset=utf-8",
        )),
        _ => None,
    }
}

fn authenticate_http(
    req: &Request<Body>,
    access: &AccessPolicy,
    allow_readonly: bool,
) -> Option<Response<Body>> {
    if access.admin_token.is_none() && access.readonly_token.is_none() {
        return None;
    }

    let raw = match req.headers().get(header::AUTHORIZATION) {
        Some(v) => v,
        None => return Some(json_error(StatusCode::UNAUTHORIZED, "missing authorization header")),
    };
    let raw_str = match raw.to_str() {
        Ok(v) => v,
        Err(_) => return Some(json_error(StatusCode::UNAUTHORIZED, "invalid authorization header")),
    };
    let token = match raw_str.strip_prefix("Bearer ") {
        Some(token) => token,
        None => return Some(json_error(StatusCode::UNAUTHORIZED, "invalid authorization scheme")),
    };

    if access.admin_token.as_deref() == Some(token) {
        return None;
    }
    if access.readonly_token.as_deref() == Some(token) {
        if allow_readonly {
            return None;
        }
        return Some(json_error(
            StatusCode::FORBIDDEN,
            "sync control is not allowed for read-only role",
        ));
    }

    Some(json_error(StatusCode::UNAUTHORIZED, "invalid token"))
}

async fn handle(
    req: Request<Body>,
    orchestrator: Arc<SyncOrchestrator>,
    access: Arc<AccessPolicy>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if let Some(resp) = dashboard_asset(&method, &path) {
        return Ok(resp);
    }
    if let Some(resp) = authenticate_http(&req, &access, method == Method::GET) {
        return Ok(resp);
    }

    let response = match (method, path.as_str()) {
        (Method::POST, "/sync") => match orchestrator.start().await {
            Ok(()) => {
                log::info!("Sync requested over HTTP");
                json_response(
                    StatusCode::OK,
                    json!({ "status": "success", "message": "Sync started" }),
                )
            }
            Err(e @ ControlError::AlreadyRunning) => {
                json_error(StatusCode::CONFLICT, &e.to_string())
            }
            Err(e) => json_error(StatusCode::BAD_REQUEST, &e.to_string()),
        },
        (Method::POST, "/sync/stop") => match orchestrator.cancel().await {
            Ok(()) => {
                log::info!("Sync stop requested over HTTP");
                json_response(
                    StatusCode::OK,
                    json!({ "status": "success", "message": "Sync process stopped" }),
                )
            }
            Err(e) => json_error(StatusCode::BAD_REQUEST, &e.to_string()),
        },
        (Method::GET, "/sync/status") => {
            let status = orchestrator.status().await;
            match serde_json::to_value(&status) {
                Ok(body) => json_response(StatusCode::OK, body),
                Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
            }
        }
        (Method::GET, "/health") => {
            let status = orchestrator.status().await;
            json_response(
                StatusCode::OK,
                json!({ "status": "ok", "is_running": status.is_running }),
            )
        }
        (Method::GET, "/metrics") => {
            let status = orchestrator.status().await;
            let mut resp = Response::new(Body::from(metrics::render(&status)));
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            resp
        }
        _ => json_error(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response)
}
