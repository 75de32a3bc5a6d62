//! Gateway server

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::idp::{IdentityProvider, IdentityProviderMount, ProviderSettings};
use crate::keys;
use crate::proxy::UploadProxy;
use crate::token::TokenIssuer;
use crate::{Error, Result};

/// Tenant gateway server
#[derive(Debug)]
pub struct Gateway {
    config: Config,
    state: Arc<AppState>,
}

impl Gateway {
    /// Assemble the gateway without an identity-provider collaborator.
    ///
    /// Loads the signing key and builds every component from the startup
    /// configuration. Fails before any socket is bound; a failure here must
    /// terminate the process.
    pub async fn new(config: Config) -> Result<Self> {
        Self::assemble(
            config,
            None::<fn(&ProviderSettings) -> Arc<dyn IdentityProvider>>,
        )
        .await
    }

    /// Assemble the gateway with a collaborator mounted at the root path.
    ///
    /// The factory receives the settings the collaborator is configured
    /// with — the public key set, cookie secrets, and issuer — exactly once.
    pub async fn with_provider<F>(config: Config, make_provider: F) -> Result<Self>
    where
        F: FnOnce(&ProviderSettings) -> Arc<dyn IdentityProvider>,
    {
        Self::assemble(config, Some(make_provider)).await
    }

    async fn assemble<F>(config: Config, make_provider: Option<F>) -> Result<Self>
    where
        F: FnOnce(&ProviderSettings) -> Arc<dyn IdentityProvider>,
    {
        let key = Arc::new(keys::load(Path::new(&config.key.path)).await?);

        let issuer = TokenIssuer::new(&config.token, Arc::clone(&key));
        let proxy = config.proxy.as_ref().map(UploadProxy::new).transpose()?;

        let settings = ProviderSettings::new(&config.token.issuer, &config.idp, &key);
        let idp = match make_provider {
            Some(make) => {
                let provider = make(&settings);
                IdentityProviderMount::with_provider(settings, provider)
            }
            None => IdentityProviderMount::new(settings),
        };

        let content_ttl_secs = config
            .token
            .content_ttl
            .map(|ttl| i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));

        let state = Arc::new(AppState {
            issuer,
            proxy,
            idp,
            content_ttl_secs,
        });

        Ok(Self { config, state })
    }

    /// Build the route table for this gateway instance
    ///
    /// # Errors
    ///
    /// Returns an error if the CORS configuration is invalid.
    pub fn router(&self) -> Result<Router> {
        create_router(Arc::clone(&self.state), &self.config.cors)
    }

    /// Bind the listener and serve until shutdown
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = self.router()?;
        let listener = TcpListener::bind(addr).await?;

        info!(host = %self.config.server.host, port = self.config.server.port, "Listening");
        info!(
            issuer = %self.config.token.issuer,
            audience = %self.config.token.audience,
            ttl = ?self.config.token.ttl,
            "Token issuance ready"
        );
        if let Some(proxy) = &self.state.proxy {
            info!(target = %proxy.target(), "Upload forwarding enabled");
        }
        if self.state.idp.settings().cookie_keys.is_empty() {
            warn!("No cookie signing secrets configured for the identity provider");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Shutdown complete");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
