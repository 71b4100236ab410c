//! HTTP admin server: Prometheus metrics and registry introspection

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use super::Metrics;
use crate::registry::{ClientId, Registry};

/// Registry contents as served on `/status`
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub sessions: usize,
    pub topics: usize,
    pub subscriptions: usize,
    pub session_ids: Vec<u64>,
    pub subscribers: BTreeMap<String, Vec<String>>,
}

/// Build a status report from one registry snapshot
pub fn status_report(registry: &Registry) -> StatusReport {
    let snapshot = registry.snapshot();
    let stats = snapshot.stats();

    let mut session_ids: Vec<u64> = snapshot.sessions.iter().map(|s| s.get()).collect();
    session_ids.sort_unstable();

    let subscribers = snapshot
        .topics
        .into_iter()
        .map(|(topic, clients)| {
            let mut clients: Vec<String> = clients.iter().map(|c| c.to_string()).collect();
            clients.sort_unstable();
            (topic, clients)
        })
        .collect();

    StatusReport {
        sessions: stats.sessions,
        topics: stats.topics,
        subscriptions: stats.subscriptions,
        session_ids,
        subscribers,
    }
}

/// HTTP server exposing `/metrics`, `/health` and `/status`
pub struct AdminServer {
    registry: Arc<Registry>,
    metrics: Option<Arc<Metrics>>,
    addr: SocketAddr,
}

impl AdminServer {
    pub fn new(registry: Arc<Registry>, metrics: Option<Arc<Metrics>>, addr: SocketAddr) -> Self {
        Self {
            registry,
            metrics,
            addr,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Admin server listening on http://{}", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let registry = self.registry.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let registry = registry.clone();
                    let metrics = metrics.clone();
                    async move {
                        Ok::<_, Infallible>(route(req.uri().path(), &registry, metrics.as_deref()))
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving admin connection: {:?}", err);
                }
            });
        }
    }
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn not_found() -> Response<Full<Bytes>> {
    respond(StatusCode::NOT_FOUND, "text/plain", "Not Found")
}

fn json(value: &impl Serialize) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(StatusCode::OK, "application/json", body),
        Err(e) => {
            error!("Failed to encode status: {}", e);
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                "Failed to encode status",
            )
        }
    }
}

pub(crate) fn route(
    path: &str,
    registry: &Registry,
    metrics: Option<&Metrics>,
) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => {
            let Some(metrics) = metrics else {
                return not_found();
            };
            metrics.observe(registry.stats());

            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();
            match encoder.encode(&metrics.registry.gather(), &mut buffer) {
                Ok(()) => respond(StatusCode::OK, "text/plain; version=0.0.4", buffer),
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    respond(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "text/plain",
                        "Failed to encode metrics",
                    )
                }
            }
        }
        "/health" | "/healthz" => respond(StatusCode::OK, "text/plain", "OK"),
        "/status" => json(&status_report(registry)),
        _ => {
            // /clients/{id}/topics
            let segment = path
                .strip_prefix("/clients/")
                .and_then(|rest| rest.strip_suffix("/topics"))
                .filter(|id| !id.is_empty() && !id.contains('/'));
            let Some(segment) = segment else {
                return not_found();
            };
            match urlencoding::decode(segment) {
                Ok(id) => {
                    let client = ClientId::from(id.into_owned());
                    let mut topics: Vec<String> = registry.get_topics(&client).into_iter().collect();
                    topics.sort_unstable();
                    json(&topics)
                }
                Err(e) => {
                    debug!("Rejected client id {:?}: {}", segment, e);
                    respond(StatusCode::BAD_REQUEST, "text/plain", "Invalid client id")
                }
            }
        }
    }
}
