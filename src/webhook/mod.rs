pub mod types;

pub use types::IssueEvent;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::pipeline;
use types::IssuePayload;

type HmacSha256 = Hmac<Sha256>;

pub fn router(config: Arc<Config>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/healthz", get(healthz))
        .with_state(config)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Webhook entry point. Signature verification happens before the payload is
/// even parsed; the pipeline then runs to completion inside the request, and
/// the sender gets a 200 acknowledgment on success and handled failure alike.
/// Failure detail goes to the operational log only; the sender is a machine,
/// not an operator.
async fn handle_webhook(
    State(config): State<Arc<Config>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if let Err(reason) = verify_signature(&body, &config.github.webhook_secret, signature) {
        warn!(reason, "rejecting webhook delivery");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid signature"})),
        );
    }

    let payload: IssuePayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(parse_error) => {
            warn!(error = %parse_error, "malformed webhook payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Malformed payload"})),
            );
        }
    };

    let event = IssueEvent::from(payload);
    info!(owner = %event.owner, repo = %event.repo, issue = event.issue_number, "verified issue event");

    match pipeline::run(&event, &config).await {
        Ok(pr_number) => (
            StatusCode::OK,
            Json(json!({"status": format!("Created pull request #{}", pr_number)})),
        ),
        Err(run_error) => {
            error!(
                error = %run_error,
                owner = %event.owner,
                repo = %event.repo,
                issue = event.issue_number,
                "pipeline run failed"
            );
            (StatusCode::OK, Json(json!({"status": "Webhook processed"})))
        }
    }
}

/// Recompute the HMAC-SHA256 of the raw body and compare it against the
/// `sha256=<hex>` header. `verify_slice` is the constant-time comparison.
fn verify_signature(body: &[u8], secret: &str, signature_header: &str) -> Result<(), &'static str> {
    if body.is_empty() {
        return Err("empty body");
    }
    if secret.is_empty() {
        return Err("webhook secret is not configured");
    }

    let signature_hex = signature_header
        .strip_prefix("sha256=")
        .ok_or("missing sha256= prefix")?;
    let expected = hex::decode(signature_hex).map_err(|_| "signature is not valid hex")?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "invalid HMAC key")?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| "signature mismatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn test_config() -> Arc<Config> {
        let mut config = Config::default();
        config.github.webhook_secret = "hush".to_string();
        config.github.token = "tok".to_string();
        config.llm.model = "test".to_string();
        config.llm.api_key = "key".to_string();
        Arc::new(config)
    }

    #[test]
    fn test_verify_signature_accepts_correct_hmac() {
        let body = b"{\"ok\": true}";
        let signature = sign(body, "hush");
        assert!(verify_signature(body, "hush", &signature).is_ok());
    }

    #[test]
    fn test_verify_signature_rejects_flipped_body_byte() {
        let body = b"{\"ok\": true}";
        let signature = sign(body, "hush");
        let tampered = b"{\"ok\": false}";
        assert!(verify_signature(tampered, "hush", &signature).is_err());
    }

    #[test]
    fn test_verify_signature_rejects_flipped_signature_char() {
        let body = b"{\"ok\": true}";
        let mut signature = sign(body, "hush");
        // Flip the final hex digit.
        let last = signature.pop().unwrap();
        signature.push(if last == '0' { '1' } else { '0' });
        assert!(verify_signature(body, "hush", &signature).is_err());
    }

    #[test]
    fn test_verify_signature_rejects_missing_prefix() {
        assert!(verify_signature(b"body", "hush", "deadbeef").is_err());
    }

    #[test]
    fn test_verify_signature_rejects_empty_body_and_secret() {
        let signature = sign(b"body", "hush");
        assert!(verify_signature(b"", "hush", &signature).is_err());
        assert!(verify_signature(b"body", "", &signature).is_err());
    }

    #[test]
    fn test_verify_signature_rejects_wrong_secret() {
        let body = b"payload";
        let signature = sign(body, "other-secret");
        assert!(verify_signature(body, "hush", &signature).is_err());
    }

    #[tokio::test]
    async fn test_healthz_responds_ok() {
        let app = router(test_config());
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_without_signature_is_unauthorized() {
        let app = router(test_config());
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_with_bad_signature_is_unauthorized() {
        let app = router(test_config());
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("x-hub-signature-256", "sha256=00ff")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_with_valid_signature_but_bad_payload_is_rejected() {
        let app = router(test_config());
        let body = b"{\"not\": \"an issue event\"}".to_vec();
        let signature = sign(&body, "hush");
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("x-hub-signature-256", signature)
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
