//! Identity-provider collaborator seam.
//!
//! The OpenID Connect protocol machinery — authorization codes, sessions,
//! consent, discovery metadata — lives entirely in an external collaborator.
//! This module owns only the gateway's side of that boundary: the settings
//! the collaborator is configured with exactly once at startup, and the
//! root-path mount that forwards raw requests to its handler.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::config::IdpConfig;
use crate::keys::{JwkSet, SigningKey};

/// Opaque collaborator failure
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Settings handed to the collaborator at startup.
#[derive(Debug)]
pub struct ProviderSettings {
    /// Issuer URL the provider announces
    pub issuer: String,
    /// Key set for token verification: the public form of the shared
    /// signing key, and nothing else
    pub jwks: JwkSet,
    /// Interactive development login pages stay off in every deployment
    pub interactive_login: bool,
    /// Cookie/session signing secrets, already resolved
    pub cookie_keys: Vec<String>,
}

impl ProviderSettings {
    /// Assemble the collaborator settings from the gateway configuration
    /// and the loaded signing key
    #[must_use]
    pub fn new(issuer: &str, config: &IdpConfig, key: &SigningKey) -> Self {
        Self {
            issuer: issuer.to_string(),
            jwks: key.jwk_set(),
            interactive_login: false,
            cookie_keys: config.resolve_cookie_keys(),
        }
    }
}

/// The external OIDC collaborator. Implementations own all protocol state;
/// the gateway never inspects what passes through.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Handle one root-path request. Failures are rendered opaquely by the
    /// mount; implementations should return the raw underlying error.
    async fn handle(&self, request: Request<Body>) -> std::result::Result<Response, ProviderError>;
}

/// Root-path mount for the collaborator's request handler.
pub struct IdentityProviderMount {
    provider: Option<Arc<dyn IdentityProvider>>,
    settings: Arc<ProviderSettings>,
}

impl std::fmt::Debug for IdentityProviderMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProviderMount")
            .field("provider", &self.provider.as_ref().map(|_| "<dyn IdentityProvider>"))
            .field("settings", &self.settings)
            .finish()
    }
}

impl IdentityProviderMount {
    /// Mount point with no collaborator linked; root-path requests answer
    /// 503 until an embedder injects one
    #[must_use]
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            provider: None,
            settings: Arc::new(settings),
        }
    }

    /// Mount point delegating to the given collaborator
    #[must_use]
    pub fn with_provider(settings: ProviderSettings, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider: Some(provider),
            settings: Arc::new(settings),
        }
    }

    /// The settings the collaborator was configured with
    #[must_use]
    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Forward a root-path request to the collaborator.
    ///
    /// Collaborator failures are logged with the underlying error; the
    /// client sees an opaque message only — no protocol internals leak.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let Some(provider) = &self.provider else {
            warn!(path = %request.uri().path(), "No identity provider mounted");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "identity provider unavailable",
            )
                .into_response();
        };

        match provider.handle(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Identity provider error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "authentication service error",
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use pretty_assertions::assert_eq;

    use crate::keys::{self, ServiceAccountKey};

    const SERVICE_ACCOUNT_JSON: &str = include_str!("../tests/fixtures/service_account.json");

    struct EchoProvider;

    #[async_trait]
    impl IdentityProvider for EchoProvider {
        async fn handle(
            &self,
            request: Request<Body>,
        ) -> std::result::Result<Response, ProviderError> {
            Ok((StatusCode::OK, format!("provider saw {}", request.uri().path())).into_response())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl IdentityProvider for FailingProvider {
        async fn handle(
            &self,
            _request: Request<Body>,
        ) -> std::result::Result<Response, ProviderError> {
            Err("session store exploded at 0x7f".into())
        }
    }

    fn test_settings() -> ProviderSettings {
        let account: ServiceAccountKey = serde_json::from_str(SERVICE_ACCOUNT_JSON).unwrap();
        let key = keys::import(&account).unwrap();
        ProviderSettings::new(
            "http://gateway.test",
            &IdpConfig {
                cookie_keys: vec!["secret-1".to_string()],
            },
            &key,
        )
    }

    #[test]
    fn settings_publish_only_the_public_key_form() {
        let settings = test_settings();
        assert_eq!(settings.issuer, "http://gateway.test");
        assert!(!settings.interactive_login);
        assert_eq!(settings.cookie_keys, vec!["secret-1".to_string()]);
        assert_eq!(settings.jwks.keys.len(), 1);
        assert_eq!(settings.jwks.keys[0].kty, "RSA");
    }

    #[tokio::test]
    async fn dispatch_forwards_to_the_collaborator() {
        let mount = IdentityProviderMount::with_provider(test_settings(), Arc::new(EchoProvider));

        let request = Request::builder()
            .uri("/.well-known/openid-configuration")
            .body(Body::empty())
            .unwrap();
        let response = mount.dispatch(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"provider saw /.well-known/openid-configuration");
    }

    #[tokio::test]
    async fn collaborator_failures_render_opaquely() {
        let mount =
            IdentityProviderMount::with_provider(test_settings(), Arc::new(FailingProvider));

        let request = Request::builder().uri("/auth").body(Body::empty()).unwrap();
        let response = mount.dispatch(request).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(body, "authentication service error");
        assert!(!body.contains("session store"));
    }

    #[tokio::test]
    async fn unmounted_provider_answers_unavailable() {
        let mount = IdentityProviderMount::new(test_settings());

        let request = Request::builder().uri("/auth").body(Body::empty()).unwrap();
        let response = mount.dispatch(request).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
