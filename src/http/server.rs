//! HTTP control-plane server.
//!
//! # Responsibilities
//! - Build the Axum router (health endpoint, fallback, middleware stack)
//! - Own the accept loop and every connection task
//! - Bounded, idempotent shutdown that force-closes stragglers
//! - Report unexpected serve failures to the orchestrator
//!
//! # Design Decisions
//! - HTTP/1.1 only, served through hyper directly so the request head has a
//!   read deadline and open connections can be closed on demand
//! - Connection tasks live in one `JoinSet`; closing the set closes them all

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::{middleware, routing::get, Router};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tower::ServiceExt;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::schema::FORCE_CLOSE_TIMEOUT;
use crate::health::HealthChecker;
use crate::http::handlers::{self, AppState};
use crate::security::{rate_limit_middleware, with_security_headers, RateLimiter};

/// Per-request deadline once the head has been read.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for a client to deliver the complete request head.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(30);

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Errors from the control-plane server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server already started")]
    AlreadyStarted,

    #[error("server stopped unexpectedly: {0}")]
    Serve(#[source] io::Error),

    #[error("in-flight requests still running after {0:?}")]
    ShutdownTimeout(Duration),

    #[error("server task failed: {0}")]
    Task(String),
}

/// Build the control-plane router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(checker: HealthChecker, limiter: Arc<RateLimiter>) -> Router {
    let state = AppState {
        checker: Arc::new(checker),
    };

    let router = Router::new()
        .route("/", get(handlers::health))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    with_security_headers(router)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    force_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owner of the listener lifecycle.
pub struct ServerManager {
    addr: String,
    router: Router,
    header_read_timeout: Duration,
    running: Option<RunningServer>,
    fault_rx: Option<oneshot::Receiver<ServerError>>,
}

impl ServerManager {
    pub fn new(addr: impl Into<String>, router: Router) -> Self {
        Self {
            addr: addr.into(),
            router,
            header_read_timeout: HEADER_READ_TIMEOUT,
            running: None,
            fault_rx: None,
        }
    }

    /// Override the request head deadline.
    pub fn with_header_read_timeout(mut self, timeout: Duration) -> Self {
        self.header_read_timeout = timeout;
        self
    }

    /// Bind and start serving in the background.
    ///
    /// Bind failures are returned; failures after that are published on the
    /// fault channel (see [`ServerManager::take_fault`]).
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let bind_err = |source| ServerError::Bind {
            addr: self.addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&self.addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let mut http = http1::Builder::new();
        http.timer(TokioTimer::new())
            .header_read_timeout(self.header_read_timeout);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (force_tx, force_rx) = oneshot::channel();
        let (fault_tx, fault_rx) = oneshot::channel();
        let router = self.router.clone();

        let task = tokio::spawn(async move {
            match serve(listener, router, http, shutdown_rx, force_rx).await {
                Ok(()) => tracing::info!("HTTP server stopped"),
                Err(e) => {
                    tracing::error!(error = %e, "HTTP server failed");
                    let _ = fault_tx.send(ServerError::Serve(e));
                }
            }
        });

        tracing::info!(
            address = %local_addr,
            header_read_timeout = ?self.header_read_timeout,
            "HTTP server starting"
        );

        self.fault_rx = Some(fault_rx);
        self.running = Some(RunningServer {
            local_addr,
            shutdown_tx,
            force_tx,
            task,
        });
        Ok(local_addr)
    }

    /// Stop accepting, give in-flight requests up to `timeout`, then close
    /// whatever is still open.
    ///
    /// A no-op when the server never started or was already shut down.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<(), ServerError> {
        let Some(running) = self.running.take() else {
            tracing::debug!("HTTP server not running, nothing to shut down");
            return Ok(());
        };

        tracing::info!(
            address = %running.local_addr,
            timeout = ?timeout,
            "Shutting down HTTP server"
        );
        let _ = running.shutdown_tx.send(());

        let mut task = running.task;
        match time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => return Err(ServerError::Task(e.to_string())),
            Err(_) => {}
        }

        tracing::warn!(timeout = ?timeout, "Closing connections still open after shutdown timeout");
        let _ = running.force_tx.send(());
        if time::timeout(FORCE_CLOSE_TIMEOUT, &mut task).await.is_err() {
            task.abort();
        }
        Err(ServerError::ShutdownTimeout(timeout))
    }

    /// Hand out the serve-failure notification. Only the first call gets a live one.
    pub fn take_fault(&mut self) -> ServerFault {
        ServerFault {
            rx: self.fault_rx.take(),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

/// Accept connections until asked to stop, then drain or force-close them.
async fn serve(
    listener: TcpListener,
    router: Router,
    http: http1::Builder,
    mut shutdown_rx: oneshot::Receiver<()>,
    force_rx: oneshot::Receiver<()>,
) -> io::Result<()> {
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();
    let mut backoff = ACCEPT_BACKOFF_MIN;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            Some(_) = connections.join_next() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    backoff = ACCEPT_BACKOFF_MIN;
                    let router = router.clone();
                    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                        request.extensions_mut().insert(ConnectInfo(peer));
                        router.clone().oneshot(request)
                    });
                    let conn = graceful.watch(http.serve_connection(TokioIo::new(stream), service));
                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!(%peer, error = %e, "Connection closed with error");
                        }
                    });
                }
                Err(e) if is_connection_error(&e) => {}
                Err(e) if is_resource_exhaustion(&e) => {
                    tracing::warn!(error = %e, retry_in = ?backoff, "Accept failed; backing off");
                    time::sleep(backoff).await;
                    backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                }
                Err(e) => return Err(e),
            },
        }
    }

    drop(listener);
    tokio::select! {
        _ = graceful.shutdown() => {}
        _ = force_rx => {
            tracing::warn!(open = connections.len(), "Force-closing connections");
        }
    }
    connections.shutdown().await;
    Ok(())
}

/// Errors that concern one connection only; the listener is still fine.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

/// Out of descriptors or buffers: worth retrying after a pause.
#[cfg(unix)]
fn is_resource_exhaustion(e: &io::Error) -> bool {
    use nix::libc;
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_resource_exhaustion(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::OutOfMemory
}

/// Resolves only if the server dies without being asked to.
pub struct ServerFault {
    rx: Option<oneshot::Receiver<ServerError>>,
}

impl ServerFault {
    /// A fault that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub async fn wait(&mut self) -> ServerError {
        if let Some(rx) = self.rx.as_mut() {
            if let Ok(err) = rx.await {
                self.rx = None;
                return err;
            }
            // sender dropped: the server stopped cleanly
            self.rx = None;
        }
        std::future::pending().await
    }
}
