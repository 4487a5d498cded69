//! Scrape endpoint for a running load test.
//!
//! `GET /metrics` renders the default Prometheus registry in text format and
//! `GET /health` answers as long as the process is alive. Anything else is a
//! 404.
//!
//! ```no_run
//! use s3_loadgen::metrics::server::MetricsServer;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut scrape = MetricsServer::new("0.0.0.0:9100");
//! let bound = scrape.start().await?;
//! tracing::info!(%bound, "scrape endpoint up");
//! // ... run waves ...
//! scrape.shutdown().await;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum MetricsServerError {
    #[error("cannot listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

struct Running {
    stop: oneshot::Sender<()>,
    accept_loop: JoinHandle<()>,
}

/// HTTP listener exposing the load generator's metrics
pub struct MetricsServer {
    address: String,
    running: Option<Running>,
}

impl MetricsServer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            running: None,
        }
    }

    /// Bind and start accepting scrapes in the background.
    ///
    /// The returned address is the one actually bound, so `:0` works.
    pub async fn start(&mut self) -> Result<SocketAddr, MetricsServerError> {
        let bind_error = |source| MetricsServerError::Bind {
            address: self.address.clone(),
            source,
        };
        let listener = TcpListener::bind(&self.address).await.map_err(bind_error)?;
        let bound = listener.local_addr().map_err(bind_error)?;

        let (stop, stopped) = oneshot::channel();
        let accept_loop = tokio::spawn(accept_scrapes(listener, stopped));
        self.running = Some(Running { stop, accept_loop });

        tracing::info!(address = %bound, "Metrics endpoint listening");
        Ok(bound)
    }

    /// Stop accepting and wait for the accept loop to exit. Idempotent.
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.stop.send(());
        let _ = running.accept_loop.await;
        tracing::debug!("Metrics endpoint stopped");
    }
}

async fn accept_scrapes(listener: TcpListener, mut stopped: oneshot::Receiver<()>) {
    loop {
        let accepted = tokio::select! {
            _ = &mut stopped => return,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                tokio::spawn(serve_scrape(stream, peer));
            }
            Err(e) => tracing::warn!(error = %e, "Metrics accept failed"),
        }
    }
}

async fn serve_scrape(stream: TcpStream, peer: SocketAddr) {
    let served = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service_fn(route))
        .await;
    if let Err(e) = served {
        tracing::debug!(%peer, error = %e, "Scrape connection closed with error");
    }
}

async fn route(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let reply = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => render_registry(),
        (&Method::GET, "/health") => reply(StatusCode::OK, "text/plain", Bytes::from_static(b"ok")),
        _ => reply(
            StatusCode::NOT_FOUND,
            "text/plain",
            Bytes::from_static(b"not found"),
        ),
    };
    Ok(reply)
}

fn render_registry() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut text = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut text) {
        tracing::error!(error = %e, "Prometheus encoding failed");
        return reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            Bytes::from_static(b"encoding failed"),
        );
    }
    reply(StatusCode::OK, "text/plain; version=0.0.4", Bytes::from(text))
}

fn reply(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
