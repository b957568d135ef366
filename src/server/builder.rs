//! ServerBuilder for fluent API to build HTTP servers

use super::handlers::AppState;
use super::layers::{default_cors, default_trace};
use super::registry::ControllerRegistry;
use super::router::{build_controller_routes, health_routes};
use crate::config::ApiConfig;
use crate::controller::ApiController;
use crate::core::store::{Store, StoreRegistry};
use anyhow::{Result, bail};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;

/// Builder for creating HTTP servers exposing controllers
///
/// # Example
///
/// ```ignore
/// let db = InMemoryDatabase::new();
/// let users = db.define(EntitySchema::new("user", ["name", "email"]))?;
///
/// ServerBuilder::new()
///     .register(ApiController::new("users", Arc::new(users)))
///     .serve("127.0.0.1:3000")
///     .await?;
/// ```
pub struct ServerBuilder {
    prefix: Option<String>,
    stores: StoreRegistry,
    controllers: ControllerRegistry,
    configs: Vec<ApiConfig>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            prefix: None,
            stores: StoreRegistry::new(),
            controllers: ControllerRegistry::new(),
            configs: Vec::new(),
            custom_routes: Vec::new(),
        }
    }

    /// Path prefix of the controller routes (default `api`)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Register a store used to bind configured controllers
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.stores.register(store);
        self
    }

    /// Register every store of a registry
    pub fn with_stores(mut self, stores: StoreRegistry) -> Self {
        for entity_type in stores.entity_types() {
            if let Some(store) = stores.get(entity_type) {
                self.stores.register(store);
            }
        }
        self
    }

    /// Register a programmatically built controller
    pub fn register(mut self, controller: ApiController) -> Self {
        self.controllers.register(controller);
        self
    }

    /// Add a configuration; controllers it declares are bound at build time
    pub fn with_config(mut self, config: ApiConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Add custom routes to the server
    ///
    /// Use this for endpoints that do not map onto a table, such as
    /// authentication or webhooks.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the final router
    ///
    /// Configured controllers are bound to their stores; a name declared both
    /// programmatically and in configuration is an error.
    pub fn build(mut self) -> Result<Router> {
        let config = (!self.configs.is_empty()).then(|| ApiConfig::merge(std::mem::take(&mut self.configs)));

        let mut controllers = std::mem::take(&mut self.controllers);
        if let Some(config) = &config {
            for controller_config in &config.controllers {
                if controllers.contains(&controller_config.name) {
                    bail!(
                        "Controller '{}' is both registered and configured",
                        controller_config.name
                    );
                }
                controllers.register(ApiController::from_config(controller_config, &self.stores));
            }
        }

        if controllers.is_empty() {
            tracing::warn!("Building a server without controllers");
        }

        let prefix = self
            .prefix
            .take()
            .or_else(|| config.map(|c| c.prefix))
            .unwrap_or_else(|| "api".to_string());
        tracing::info!(prefix = %prefix, controllers = ?controllers.names(), "Registering controller routes");

        let state = AppState {
            controllers: Arc::new(controllers),
        };

        let mut app = health_routes().merge(build_controller_routes(&prefix, state));
        for custom_router in std::mem::take(&mut self.custom_routes) {
            app = app.merge(custom_router);
        }

        Ok(app.layer(
            ServiceBuilder::new()
                .layer(default_trace())
                .layer(default_cors()),
        ))
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
