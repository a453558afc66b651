//! HTTP server and graceful shutdown.
//!
//! The server is a thin host around [`Router::dispatch`]: it accepts
//! connections, reads each request body in full, hands the request to the
//! router, and writes back whatever the router produced.
//!
//! # Graceful shutdown
//!
//! On the shutdown signal (SIGTERM or Ctrl-C by default) the server:
//! 1. Immediately stops `listener.accept()`, so no new connections are made.
//! 2. Lets in-flight connection tasks run, for at most the shutdown timeout
//!    (10 s unless changed with [`Server::shutdown_timeout`]).
//! 3. Aborts whatever is still running and returns from [`Server::serve`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::dispatch;
use crate::error::{Error, HandlerError};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
    shutdown_timeout: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when it starts serving.
    ///
    /// ```rust,no_run
    /// use vireo::Server;
    /// let server = Server::bind("0.0.0.0:3000")?;
    /// # Ok::<(), vireo::Error>(())
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| Error::InvalidAddress(addr.to_owned()))?;
        Ok(Self { bind: Bind::Addr(addr), shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT })
    }

    /// Serves on an already-bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener), shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT }
    }

    /// How long in-flight connections may keep running after shutdown starts.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Serves `router` until SIGTERM or Ctrl-C, then shuts down gracefully.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serves `router` until `signal` resolves, then shuts down gracefully.
    pub async fn serve_with_shutdown<F>(self, router: Router, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let addr = listener.local_addr()?;

        // Shared across concurrent connection tasks without copying the table.
        let router = Arc::new(router);

        info!(%addr, routes = router.len(), "listening");

        let mut tasks = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting immediately,
                // even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { handle(&router, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(%peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(self.shutdown_timeout, drain).await.is_err() {
            warn!(aborted = tasks.len(), "shutdown timeout elapsed, aborting connections");
            tasks.shutdown().await;
        }

        info!("stopped");
        Ok(())
    }
}

/// Turns one hyper request into one response. Never fails: every problem is
/// answered with an HTTP error.
async fn handle(
    router: &Router,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("failed to read request body: {e}");
            return Ok(reject(StatusCode::BAD_REQUEST, "failed to read request body"));
        }
    };

    match Request::from_parts(parts, body) {
        Ok(request) => Ok(router.dispatch(request).await),
        Err(e) => Ok(reject(StatusCode::METHOD_NOT_ALLOWED, &e.to_string())),
    }
}

fn reject(status: StatusCode, message: &str) -> http::Response<Full<Bytes>> {
    let response = Response::new();
    dispatch::write_error(&response, &HandlerError::with_status(status, message));
    response.take()
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both SIGTERM and SIGINT (Ctrl-C); elsewhere only
/// Ctrl-C is available. If a handler cannot be installed the failure is
/// logged and that signal is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
