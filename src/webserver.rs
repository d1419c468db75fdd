use crate::configs::ServerConfig;
use crate::trust_chain::TrustChain;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use log::info;
use std::sync::Arc;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Routes publishing the bootstrapped certificates as PEM text.
///
/// Handlers only read the shared chain; they never trigger generation.
pub fn router(chain: Arc<TrustChain>) -> Router {
    Router::new()
        .route("/api/certificates/ca", get(get_ca_certificate))
        .route(
            "/api/certificates/intermediate",
            get(get_intermediate_certificate),
        )
        .with_state(chain)
}

pub fn start_webserver(server: &ServerConfig, chain: Arc<TrustChain>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    rt.block_on(async {
        let addr = format!("{}:{}", server.host, server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("HTTP server listening on http://{}", addr);
        info!("   GET /api/certificates/ca");
        info!("   GET /api/certificates/intermediate");

        axum::serve(listener, router(chain))
            .await
            .context("HTTP server terminated")
    })
}

async fn get_ca_certificate(State(chain): State<Arc<TrustChain>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        chain.root_certificate_pem().to_string(),
    )
}

async fn get_intermediate_certificate(State(chain): State<Arc<TrustChain>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        chain.intermediate_certificate_pem().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_state::ChainState;
    use crate::configs::CertificateConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    fn test_chain(dir: &std::path::Path) -> Arc<TrustChain> {
        let mut config = CertificateConfig::with_directory(dir);
        config.key_bits = 2048;
        ChainState::bootstrap(&config).unwrap().chain()
    }

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_get_ca_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let chain = test_chain(dir.path());

        let (status, content_type, body) =
            get_text(router(Arc::clone(&chain)), "/api/certificates/ca").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("BEGIN CERTIFICATE"));
        assert_eq!(body, chain.root_certificate_pem());
    }

    #[tokio::test]
    async fn test_get_intermediate_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let chain = test_chain(dir.path());

        let (status, _, body) =
            get_text(router(Arc::clone(&chain)), "/api/certificates/intermediate").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, chain.intermediate_certificate_pem());
        assert_eq!(
            body,
            std::fs::read_to_string(dir.path().join("intermediate.crt")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_chain(dir.path()));

        let (status, _, _) = get_text(app.clone(), "/api/certificates/leaf").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/certificates/ca")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
