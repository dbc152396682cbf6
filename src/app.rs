// src/app.rs

//! Explicit wiring of registry, runner and handlers.
//!
//! Nothing registers itself: the host builds one `App` from a validated
//! config, and the `App` provisions and validates every handler before any of
//! them is exposed.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{ConfigFile, ServerSettings};
use crate::errors::Result;
use crate::exec::{CommandRunner, ProcessRunner, ShutdownReport};
use crate::handler::{Lifecycle, ProvisionContext, RequestHandler};
use crate::registry::AppRegistry;
use crate::server;

pub struct App {
    settings: ServerSettings,
    registry: Arc<AppRegistry>,
    runner: Arc<dyn CommandRunner>,
    handlers: Vec<Arc<RequestHandler>>,
}

impl App {
    /// Build with the production [`ProcessRunner`].
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let registry = Arc::new(AppRegistry::new(cfg.server.grace_period));
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new(
            Arc::clone(registry.tracker()),
            cfg.server.grace_period,
        ));
        Self::with_runner(cfg, registry, runner)
    }

    /// Build with a caller-supplied runner (tests use a fake one).
    ///
    /// Every handler is provisioned, then every handler is validated. The
    /// first error aborts; nothing is served.
    pub fn with_runner(
        cfg: &ConfigFile,
        registry: Arc<AppRegistry>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let ctx = ProvisionContext {
            registry: Arc::clone(&registry),
            runner: Arc::clone(&runner),
            default_timeout_ms: cfg.server.default_timeout_ms,
        };

        let mut handlers: Vec<RequestHandler> = Vec::with_capacity(cfg.command.len());
        for (name, command) in cfg.command.iter() {
            let mut handler = RequestHandler::new(name.clone(), command.clone());
            handler.provision(&ctx)?;
            handlers.push(handler);
        }
        for handler in handlers.iter_mut() {
            handler.validate()?;
        }

        info!(
            handlers = handlers.len(),
            registered = registry.len(),
            "all handlers provisioned and validated"
        );

        Ok(Self {
            settings: cfg.server.clone(),
            registry,
            runner,
            handlers: handlers.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn handlers(&self) -> &[Arc<RequestHandler>] {
        &self.handlers
    }

    pub fn handler(&self, name: &str) -> Option<&Arc<RequestHandler>> {
        self.handlers.iter().find(|h| h.name() == name)
    }

    pub fn router(&self) -> Router {
        server::build_router(&self.handlers)
    }

    /// Run `at = ["startup"]` commands. Returns the number that failed.
    pub async fn startup(&self) -> usize {
        self.registry.run_startup(self.runner.as_ref()).await
    }

    /// Serve HTTP on `listener` until `signal` resolves, then tear down.
    ///
    /// Teardown starts as soon as the signal fires, while axum is still
    /// draining connections: in-flight commands are terminated, their
    /// requests answer `terminated during shutdown`, and the drain completes.
    pub async fn serve<F>(
        self: Arc<Self>,
        listener: TcpListener,
        signal: F,
    ) -> anyhow::Result<ShutdownReport>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let teardown = Arc::clone(&self);
        let shutdown = async move {
            signal.await;
            tokio::spawn(async move {
                let report = teardown.shutdown().await;
                let _ = done_tx.send(report);
            });
        };

        let served = server::serve(listener, self.router(), shutdown).await;

        // Serving can fail before the signal ever fired.
        let report = match done_rx.await {
            Ok(report) => report,
            Err(_) => self.shutdown().await,
        };
        debug!(?report, "shutdown complete");
        served.map(|()| report)
    }

    /// Clean up every handler, then tear the registry down.
    pub async fn shutdown(&self) -> ShutdownReport {
        for handler in self.handlers.iter() {
            if let Err(e) = handler.cleanup().await {
                warn!(command = %handler.name(), error = %e, "handler cleanup failed");
            }
        }
        self.registry.shutdown(self.runner.as_ref()).await
    }
}
