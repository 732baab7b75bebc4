//! Health server lifecycle.
//!
//! `start` binds and serves until `stop` is called. It is meant to run as a
//! background task next to the host application's own work:
//!
//! ```no_run
//! use tiny_healthcheck::{HealthReport, HealthServer, ServerConfig, StaticHealth};
//!
//! # async fn run() {
//! let server = HealthServer::new(
//!     StaticHealth::new(HealthReport::ok("OK")),
//!     ServerConfig::default(),
//! );
//! let task = server.spawn();
//! // ... application work ...
//! server.stop();
//! task.await.unwrap().unwrap();
//! # }
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum_server::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::HealthServerError;
use crate::evaluator::{HealthEvaluator, HealthReport};

use super::dispatch::{create_router, Dispatcher};

/// Non-blocking HTTP health check endpoint.
///
/// Cloning is cheap; clones share the same lifecycle, so `stop` on any clone
/// ends a `start` running on another.
#[derive(Clone)]
pub struct HealthServer {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    /// Written only while `lifecycle` is locked
    running: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    listening: watch::Sender<ListenState>,
}

/// Ownership of the running state across overlapping `start` calls.
///
/// A `start` that was stopped may still be unwinding when the next one claims
/// the server; its cleanup only applies while `generation` is still its own.
#[derive(Default)]
struct Lifecycle {
    /// Bumped by every accepted `start`
    generation: u64,
    /// Shutdown handle of the active listener
    handle: Option<Handle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenState {
    Idle,
    Binding,
    Bound(SocketAddr),
}

impl HealthServer {
    /// Create a server. Nothing is bound until `start`.
    ///
    /// Pass an `Arc` to keep a handle on the evaluator outside the server.
    pub fn new<E>(evaluator: E, config: ServerConfig) -> Self
    where
        E: HealthEvaluator + 'static,
    {
        let evaluator: Arc<dyn HealthEvaluator> = Arc::new(evaluator);
        let (listening, _) = watch::channel(ListenState::Idle);

        Self {
            inner: Arc::new(Inner {
                dispatcher: Arc::new(Dispatcher::new(&config.path, evaluator)),
                config,
                running: AtomicBool::new(false),
                lifecycle: Mutex::new(Lifecycle::default()),
                listening,
            }),
        }
    }

    /// Create a server on `0.0.0.0:8000` answering `/healthcheck`.
    pub fn with_defaults<E>(evaluator: E) -> Self
    where
        E: HealthEvaluator + 'static,
    {
        Self::new(evaluator, ServerConfig::default())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, if serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match *self.inner.listening.borrow() {
            ListenState::Bound(addr) => Some(addr),
            _ => None,
        }
    }

    /// Wait for a pending `start` to bind and return its address.
    ///
    /// Returns `None` right away when no `start` is in progress, and as soon
    /// as a pending one gives up without binding.
    pub async fn wait_listening(&self) -> Option<SocketAddr> {
        let mut rx = self.inner.listening.subscribe();
        let state = rx
            .wait_for(|state| *state != ListenState::Binding)
            .await
            .ok()?;
        match *state {
            ListenState::Bound(addr) => Some(addr),
            _ => None,
        }
    }

    /// Answer a single request path without going through the network.
    pub async fn handle(&self, path: &str) -> HealthReport {
        self.inner.dispatcher.dispatch(path, None).await
    }

    /// Run `start` on a new Tokio task.
    ///
    /// The server is claimed before this returns, so `wait_listening` and
    /// `stop` called right after apply to the spawned task.
    pub fn spawn(&self) -> JoinHandle<Result<(), HealthServerError>> {
        match self.claim() {
            Ok(generation) => {
                let server = self.clone();
                tokio::spawn(async move { server.serve(generation).await })
            }
            Err(e) => tokio::spawn(async move { Err(e) }),
        }
    }

    /// Bind and serve until `stop` is called.
    ///
    /// Fails with `AlreadyRunning` if this server is already serving; no
    /// second socket is opened in that case. Bind failures are returned as-is
    /// and leave the server startable again.
    pub async fn start(&self) -> Result<(), HealthServerError> {
        let generation = self.claim()?;
        self.serve(generation).await
    }

    fn claim(&self) -> Result<u64, HealthServerError> {
        let mut lifecycle = self.lock_lifecycle();
        if self.inner.running.load(Ordering::SeqCst) {
            tracing::warn!("Health server start requested while already running");
            return Err(HealthServerError::AlreadyRunning);
        }

        self.inner.running.store(true, Ordering::SeqCst);
        lifecycle.generation += 1;
        self.inner.listening.send_replace(ListenState::Binding);
        Ok(lifecycle.generation)
    }

    /// Undo a claim, unless a later `start` has taken the server over.
    fn release(&self, lifecycle: &mut Lifecycle, generation: u64) {
        if lifecycle.generation != generation {
            return;
        }
        lifecycle.handle = None;
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.listening.send_replace(ListenState::Idle);
    }

    async fn serve(&self, generation: u64) -> Result<(), HealthServerError> {
        let (listener, addr) = match self.bind().await {
            Ok(bound) => bound,
            Err(e) => {
                self.release(&mut self.lock_lifecycle(), generation);
                tracing::error!(
                    bind_address = %self.inner.config.bind_address(),
                    error = %e,
                    "Failed to start health server"
                );
                return Err(e);
            }
        };

        let handle = Handle::new();
        {
            let mut lifecycle = self.lock_lifecycle();
            // stop() landed while binding
            if lifecycle.generation != generation || !self.inner.running.load(Ordering::SeqCst) {
                self.release(&mut lifecycle, generation);
                tracing::debug!(%addr, "Health server stopped before serving");
                return Ok(());
            }
            lifecycle.handle = Some(handle.clone());
            self.inner.listening.send_replace(ListenState::Bound(addr));
        }

        tracing::info!(
            %addr,
            path = %self.inner.config.path,
            generation,
            "Health server listening"
        );

        let app = create_router(self.inner.dispatcher.clone());
        let result = axum_server::from_tcp(listener)
            .handle(handle)
            .serve(app.into_make_service())
            .await;

        self.release(&mut self.lock_lifecycle(), generation);

        match result {
            Ok(()) => {
                tracing::info!(%addr, generation, "Health server stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(%addr, error = %e, "Health server failed");
                Err(HealthServerError::Serve(e))
            }
        }
    }

    /// Signal the serving loop to end.
    ///
    /// The listener stops accepting immediately; in-flight requests are left
    /// to finish. Calling this when not running does nothing.
    pub fn stop(&self) {
        self.signal_stop(None);
    }

    /// Like `stop`, but in-flight requests are dropped after `grace`.
    pub fn stop_with_grace(&self, grace: Duration) {
        self.signal_stop(Some(grace));
    }

    fn signal_stop(&self, grace: Option<Duration>) {
        let mut lifecycle = self.lock_lifecycle();
        let was_running = self.inner.running.swap(false, Ordering::SeqCst);

        if let Some(handle) = lifecycle.handle.take() {
            tracing::info!(grace_secs = ?grace.map(|g| g.as_secs()), "Stopping health server");
            handle.graceful_shutdown(grace);
        } else if was_running {
            tracing::debug!("Stop requested before the listener was ready");
        }
    }

    async fn bind(&self) -> Result<(std::net::TcpListener, SocketAddr), HealthServerError> {
        let config = &self.inner.config;
        let invalid = |source| HealthServerError::InvalidAddress {
            addr: config.bind_address(),
            source,
        };

        let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
            .await
            .map_err(invalid)?
            .next()
            .ok_or_else(|| {
                invalid(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "host resolved to no addresses",
                ))
            })?;

        let listener = std::net::TcpListener::bind(addr).map_err(HealthServerError::Bind)?;
        listener
            .set_nonblocking(true)
            .map_err(HealthServerError::Bind)?;
        let local = listener.local_addr().map_err(HealthServerError::Bind)?;

        Ok((listener, local))
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::StaticHealth;
    use http::StatusCode;

    fn local_server(path: &str) -> HealthServer {
        HealthServer::new(
            StaticHealth::new(HealthReport::ok("OK")),
            ServerConfig::new("127.0.0.1", 0, path),
        )
    }

    #[test]
    fn test_new_has_no_side_effects() {
        let server = local_server("/healthcheck");
        assert!(!server.is_running());
        assert_eq!(server.local_addr(), None);
    }

    #[test]
    fn test_with_defaults_uses_default_config() {
        let server = HealthServer::with_defaults(StaticHealth::new(HealthReport::ok("OK")));
        assert_eq!(server.config(), &ServerConfig::default());
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let server = local_server("/healthcheck");
        server.stop();
        server.stop();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_handle_dispatches_without_network() {
        let server = local_server("/healthcheck");
        assert_eq!(server.handle("/healthcheck/").await, HealthReport::ok("OK"));
        assert_eq!(
            server.handle("/other").await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_second_start_fails_while_running() {
        let server = local_server("/healthcheck");
        let task = server.spawn();
        let addr = server.wait_listening().await.unwrap();

        let err = server.start().await.unwrap_err();
        assert!(err.is_already_running());
        // The first listener is untouched
        assert_eq!(server.local_addr(), Some(addr));

        server.stop();
        task.await.unwrap().unwrap();
        assert!(!server.is_running());
        assert_eq!(server.local_addr(), None);
    }

    #[tokio::test]
    async fn test_clone_shares_lifecycle() {
        let server = local_server("/healthcheck");
        let clone = server.clone();
        let task = server.spawn();
        clone.wait_listening().await.unwrap();

        assert!(clone.is_running());
        assert!(clone.start().await.unwrap_err().is_already_running());

        clone.stop();
        task.await.unwrap().unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_invalid_address() {
        let server = HealthServer::new(
            StaticHealth::new(HealthReport::ok("OK")),
            ServerConfig::new("not a host name", 0, "/healthcheck"),
        );
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, HealthServerError::InvalidAddress { .. }));
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_bind_conflict_resets_running_flag() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let server = HealthServer::new(
            StaticHealth::new(HealthReport::ok("OK")),
            ServerConfig::new("127.0.0.1", port, "/healthcheck"),
        );
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, HealthServerError::Bind(_)));
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_wait_listening_without_start_is_none() {
        let server = local_server("/healthcheck");
        assert_eq!(server.wait_listening().await, None);
    }

    #[tokio::test]
    async fn test_wait_listening_returns_none_after_bind_failure() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();
        let server = HealthServer::new(
            StaticHealth::new(HealthReport::ok("OK")),
            ServerConfig::new("127.0.0.1", port, "/healthcheck"),
        );

        let task = server.spawn();
        let addr = tokio::time::timeout(Duration::from_secs(5), server.wait_listening())
            .await
            .expect("wait_listening hung after a failed bind");
        assert_eq!(addr, None);
        assert!(matches!(task.await.unwrap(), Err(HealthServerError::Bind(_))));
    }

    #[tokio::test]
    async fn test_spawn_claims_before_returning() {
        let server = local_server("/healthcheck");
        let task = server.spawn();
        assert!(server.is_running());
        assert!(server.start().await.unwrap_err().is_already_running());

        server.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unwinding_start_leaves_restarted_server_alone() {
        let server = local_server("/healthcheck");
        let first = server.spawn();
        server.wait_listening().await.unwrap();

        server.stop();
        let second = server.spawn();
        // The first task finishes its cleanup after the second claimed the server
        first.await.unwrap().unwrap();

        let addr = server.wait_listening().await.expect("restarted server never bound");
        assert!(server.is_running());
        assert_eq!(server.local_addr(), Some(addr));

        server.stop();
        tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .expect("restarted server ignored stop")
            .unwrap()
            .unwrap();
        assert!(!server.is_running());
        assert_eq!(server.local_addr(), None);
    }
}
