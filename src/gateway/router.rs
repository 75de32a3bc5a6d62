//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Map, json};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::debug;

use crate::config::CorsConfig;
use crate::idp::IdentityProviderMount;
use crate::proxy::UploadProxy;
use crate::token::TokenIssuer;
use crate::{Error, Result};

/// Shared application state, constructed once at startup
#[derive(Debug)]
pub struct AppState {
    /// Token issuer over the shared signing key
    pub issuer: TokenIssuer,
    /// Upload forwarder; `None` in deployments without the upload route
    pub proxy: Option<UploadProxy>,
    /// Root-path identity-provider mount
    pub idp: IdentityProviderMount,
    /// Content-expiry claim lifetime in seconds, when the deployment
    /// includes the custom claim
    pub content_ttl_secs: Option<i64>,
}

/// Create the router
///
/// Explicit routes overlay the root fallback: everything not matched below
/// belongs to the identity-provider collaborator.
///
/// # Errors
///
/// Returns an error if the CORS allow-origin is not a valid header value.
pub fn create_router(state: Arc<AppState>, cors: &CorsConfig) -> Result<Router> {
    let mut api = Router::new().route("/token", get(token_handler));
    if state.proxy.is_some() {
        api = api.route("/upload", post(upload_handler));
    }
    // CORS applies only to the gateway's own API surface; the provider
    // mount owns its response headers.
    let api = api.layer(cors_layer(cors)?);

    Ok(Router::new()
        .route("/upload.html", get(upload_form_handler))
        .nest("/api", api)
        .fallback(idp_handler)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Build the CORS layer for the API routes
fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if config.allow_origin == "*" {
        Ok(layer.allow_origin(Any))
    } else {
        let origin = config
            .allow_origin
            .parse::<HeaderValue>()
            .map_err(|e| Error::Config(format!("Invalid CORS allow-origin: {e}")))?;
        Ok(layer.allow_origin(origin))
    }
}

/// `GET /api/token` — freshly signed tenant token, text body
async fn token_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let custom = state.content_ttl_secs.map(|ttl| {
        let mut claims = Map::new();
        claims.insert(
            "content_exp".to_string(),
            json!(Utc::now().timestamp() + ttl),
        );
        claims
    });

    let token = state.issuer.issue(custom.as_ref())?;
    debug!("Issued tenant token");

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        token,
    ))
}

/// `POST /api/upload` — forward to the fixed upstream under the rewritten
/// identity
async fn upload_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let proxy = state
        .proxy
        .as_ref()
        .ok_or_else(|| Error::request(StatusCode::NOT_FOUND, "upload forwarding is not enabled"))?;
    proxy.forward(&headers, body).await
}

/// `GET /upload.html` — static upload form
async fn upload_form_handler() -> Html<String> {
    Html(upload_page())
}

/// Root-path fallback — everything not explicitly routed belongs to the
/// identity-provider collaborator
async fn idp_handler(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    state.idp.dispatch(request).await
}

fn upload_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <title>Upload</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            color: white;
        }
        .container {
            text-align: center;
            padding: 2rem;
            background: rgba(255,255,255,0.1);
            border-radius: 16px;
            backdrop-filter: blur(10px);
        }
        h1 { margin: 0 0 1rem 0; }
        button {
            margin-top: 1rem;
            padding: 0.5rem 1.5rem;
            border: none;
            border-radius: 8px;
            cursor: pointer;
        }
        #result { margin-top: 1rem; font-family: monospace; word-break: break-all; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Upload</h1>
        <input type="file" id="file">
        <button id="send">Send</button>
        <p id="result"></p>
    </div>
    <script>
        document.getElementById('send').addEventListener('click', async () => {
            const result = document.getElementById('result');
            const input = document.getElementById('file');
            if (!input.files.length) {
                result.textContent = 'Pick a file first';
                return;
            }
            const token = await (await fetch('/api/token')).text();
            const response = await fetch('/api/upload', {
                method: 'POST',
                headers: { 'Authorization': 'Bearer ' + token },
                body: input.files[0],
            });
            result.textContent = response.status + ' ' + await response.text();
        });
    </script>
</body>
</html>"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::routing::get;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::config::{IdpConfig, TokenConfig};
    use crate::idp::ProviderSettings;
    use crate::keys::{self, ServiceAccountKey};

    const SERVICE_ACCOUNT_JSON: &str = include_str!("../../tests/fixtures/service_account.json");

    fn test_state(content_ttl_secs: Option<i64>) -> Arc<AppState> {
        let account: ServiceAccountKey = serde_json::from_str(SERVICE_ACCOUNT_JSON).unwrap();
        let key = Arc::new(keys::import(&account).unwrap());
        let config = TokenConfig {
            issuer: "http://gateway.test".to_string(),
            subject: "CUS000999".to_string(),
            audience: "https://functions.test/upload".to_string(),
            ttl: Duration::from_secs(60),
            content_ttl: None,
        };
        let settings = ProviderSettings::new(
            &config.issuer,
            &IdpConfig {
                cookie_keys: vec!["secret".to_string()],
            },
            &key,
        );

        Arc::new(AppState {
            issuer: TokenIssuer::new(&config, key),
            proxy: None,
            idp: IdentityProviderMount::new(settings),
            content_ttl_secs,
        })
    }

    fn test_router(state: Arc<AppState>) -> Router {
        create_router(
            state,
            &CorsConfig {
                allow_origin: "*".to_string(),
            },
        )
        .unwrap()
    }

    fn decode_payload(token: &str) -> Value {
        use base64::Engine;
        let payload = token.split('.').nth(1).unwrap();
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn token_route_returns_a_fresh_compact_token() {
        let app = test_router(test_state(None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let token = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = decode_payload(&token);
        assert_eq!(claims["iss"], "http://gateway.test");
        assert_eq!(claims["sub"], "CUS000999");
        assert_eq!(claims["aud"], "https://functions.test/upload");
        assert_eq!(
            claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
            60
        );
    }

    #[tokio::test]
    async fn content_expiry_claim_follows_the_deployment_toggle() {
        let app = test_router(test_state(Some(86_400)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let token = String::from_utf8(body.to_vec()).unwrap();

        let claims = decode_payload(&token);
        let iat = claims["iat"].as_i64().unwrap();
        let content_exp = claims["content_exp"].as_i64().unwrap();
        // Separate clock reads; allow a few seconds of skew
        assert!((content_exp - iat - 86_400).abs() < 5);
    }

    #[tokio::test]
    async fn token_without_toggle_has_no_content_claim() {
        let app = test_router(test_state(None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let token = String::from_utf8(body.to_vec()).unwrap();

        assert!(decode_payload(&token).get("content_exp").is_none());
    }

    #[tokio::test]
    async fn api_responses_carry_the_cors_policy() {
        let app = test_router(test_state(None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/token")
                    .header(header::ORIGIN, "http://somewhere.else")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            HeaderValue::from_static("*")
        );
    }

    #[tokio::test]
    async fn upload_route_is_absent_without_a_proxy() {
        let app = test_router(test_state(None));

        // Falls through to the provider mount, which is unconfigured here
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/upload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn upload_form_renders() {
        let app = test_router(test_state(None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/upload.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains("/api/upload"));
        assert!(page.contains("/api/token"));
    }

    #[tokio::test]
    async fn root_traffic_falls_back_to_the_provider_mount() {
        let app = test_router(test_state(None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/.well-known/openid-configuration")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn error_middleware_uses_the_carried_status_and_message() {
        let app: Router = Router::new()
            .route(
                "/missing",
                get(|| async {
                    Err::<(), Error>(Error::request(StatusCode::NOT_FOUND, "no such upload"))
                }),
            )
            .route(
                "/broken",
                get(|| async { Err::<(), Error>(Error::Config("wires crossed".to_string())) }),
            );

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"no such upload");

        // No carried status: default internal failure
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/broken")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Configuration error: wires crossed");
    }
}
