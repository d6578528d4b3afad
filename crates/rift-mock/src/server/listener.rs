//! TCP listener serving one `MockServer` over HTTP/1.1.

use super::core::MockServer;
use super::handler::{to_http_request, to_hyper_response};
use super::router::route;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub struct MockListener {
    listener: TcpListener,
    server: Arc<MockServer>,
}

impl MockListener {
    /// Bind `addr` (port 0 picks a free port) and record the bound port on `server`.
    pub async fn bind(addr: SocketAddr, server: Arc<MockServer>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        server.set_port(local.port());
        Ok(Self { listener, server })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the process exits.
    pub async fn run(self) -> anyhow::Result<()> {
        self.serve(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves. Connections already accepted run to completion.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let local = self.listener.local_addr()?;
        info!("Mock server listening on http://{}", local);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Mock server on port {} shutting down", local.port());
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let server = Arc::clone(&self.server);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { handle_request(req, server).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(peer = %peer, "Mock server connection error: {}", e);
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    server: Arc<MockServer>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(error = %e, "Failed to read request body");
            let mut response = Response::new(Full::new(Bytes::from(format!("Failed to read body: {e}"))));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };
    let request = to_http_request(&parts, body);
    let response = route(&server, request).await;
    Ok(to_hyper_response(&response))
}
