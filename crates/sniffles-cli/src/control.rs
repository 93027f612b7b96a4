//! Control API
//!
//! JSON endpoints for driving the fault policy and inspecting history,
//! mounted under `/__sniffles`:
//!
//! | Method   | Path       | Effect                                   |
//! |----------|------------|------------------------------------------|
//! | `GET`    | `/history` | History snapshot, oldest first           |
//! | `DELETE` | `/history` | Clear history                            |
//! | `GET`    | `/last`    | Last request and latest record           |
//! | `GET`    | `/policy`  | Current fault policy                     |
//! | `DELETE` | `/policy`  | Disable all faults                       |
//! | `PUT`    | `/failure` | `{"enabled": bool, "kind": "timeout"}`   |
//! | `PUT`    | `/delay`   | `{"millis": 250}`                        |
//! | `PUT`    | `/stall`   | `{"enabled": bool}`                      |
//!
//! Malformed command bodies are answered with the extractor's status code and
//! a `{"error": "..."}` body.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sniffles_core::{CallRecord, FailureKind, FaultPolicySnapshot, LastRequest};
use std::time::Duration;

use crate::http_proxy::ProxyState;

#[derive(Debug, Deserialize)]
pub struct FailureCommand {
    pub enabled: bool,
    /// Keeps the current kind when omitted
    #[serde(default)]
    pub kind: Option<FailureKind>,
}

#[derive(Debug, Deserialize)]
pub struct DelayCommand {
    pub millis: u64,
}

#[derive(Debug, Deserialize)]
pub struct StallCommand {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct LastView {
    pub last_request: Option<LastRequest>,
    pub latest_record: Option<CallRecord>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Rejected control command
#[derive(Debug)]
pub struct ControlError {
    status: StatusCode,
    message: String,
}

impl From<JsonRejection> for ControlError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        tracing::warn!("Rejected control command: {}", self.message);
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type CommandResult = Result<Json<FaultPolicySnapshot>, ControlError>;

pub fn routes() -> Router<ProxyState> {
    Router::new()
        .route("/history", get(get_history).delete(clear_history))
        .route("/last", get(get_last))
        .route("/policy", get(get_policy).delete(reset_policy))
        .route("/failure", put(set_failure))
        .route("/delay", put(set_delay))
        .route("/stall", put(set_stall))
}

async fn get_history(State(state): State<ProxyState>) -> Json<Vec<CallRecord>> {
    Json(state.sniffles.request_history())
}

async fn clear_history(State(state): State<ProxyState>) -> StatusCode {
    state.sniffles.clear_history();
    StatusCode::NO_CONTENT
}

async fn get_last(State(state): State<ProxyState>) -> Json<LastView> {
    Json(LastView {
        last_request: state.sniffles.last_request(),
        latest_record: state.sniffles.latest_record(),
    })
}

async fn get_policy(State(state): State<ProxyState>) -> Json<FaultPolicySnapshot> {
    Json(state.sniffles.policy())
}

async fn reset_policy(State(state): State<ProxyState>) -> Json<FaultPolicySnapshot> {
    state.sniffles.reset_policy();
    Json(state.sniffles.policy())
}

async fn set_failure(
    State(state): State<ProxyState>,
    command: Result<Json<FailureCommand>, JsonRejection>,
) -> CommandResult {
    let Json(command) = command?;
    let kind = command
        .kind
        .unwrap_or_else(|| state.sniffles.policy().failure_kind);
    state.sniffles.set_failure(command.enabled, kind);
    Ok(Json(state.sniffles.policy()))
}

async fn set_delay(
    State(state): State<ProxyState>,
    command: Result<Json<DelayCommand>, JsonRejection>,
) -> CommandResult {
    let Json(command) = command?;
    state
        .sniffles
        .set_delay(Duration::from_millis(command.millis));
    Ok(Json(state.sniffles.policy()))
}

async fn set_stall(
    State(state): State<ProxyState>,
    command: Result<Json<StallCommand>, JsonRejection>,
) -> CommandResult {
    let Json(command) = command?;
    state.sniffles.set_infinite_loading(command.enabled);
    Ok(Json(state.sniffles.policy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_proxy::build_router;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use reqwest::Client;
    use sniffles_core::{RequestSummary, Sniffles};
    use tower::ServiceExt;

    fn router(sniffles: &Sniffles) -> Router {
        // Upstream is never contacted by control routes
        build_router(ProxyState::new(
            "http://127.0.0.1:9".to_string(),
            sniffles.clone(),
            Client::new(),
        ))
    }

    fn json_request(method: Method, path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(
        sniffles: &Sniffles,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = router(sniffles).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn seed(sniffles: &Sniffles, url: &str) {
        let result = sniffles
            .intercept(RequestSummary::new("GET", url), || async {
                Ok::<_, std::convert::Infallible>(axum::http::Response::new(()))
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_set_failure_and_read_policy() {
        let sniffles = Sniffles::new();

        let (status, json) = send(
            &sniffles,
            json_request(
                Method::PUT,
                "/__sniffles/failure",
                r#"{"enabled": true, "kind": "server_error"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["failure_enabled"], true);
        assert_eq!(json["failure_kind"], "server_error");

        // Omitted kind keeps the current one
        send(
            &sniffles,
            json_request(Method::PUT, "/__sniffles/failure", r#"{"enabled": false}"#),
        )
        .await;
        let policy = sniffles.policy();
        assert!(!policy.failure_enabled);
        assert_eq!(policy.failure_kind, FailureKind::ServerError);
    }

    #[tokio::test]
    async fn test_set_delay_and_stall() {
        let sniffles = Sniffles::new();

        let (_, json) = send(
            &sniffles,
            json_request(Method::PUT, "/__sniffles/delay", r#"{"millis": 750}"#),
        )
        .await;
        assert_eq!(json["delay_ms"], 750);

        let (_, json) = send(
            &sniffles,
            json_request(Method::PUT, "/__sniffles/stall", r#"{"enabled": true}"#),
        )
        .await;
        assert_eq!(json["infinite_stall"], true);

        let (_, json) = send(
            &sniffles,
            json_request(Method::DELETE, "/__sniffles/policy", ""),
        )
        .await;
        assert_eq!(json["delay_ms"], 0);
        assert_eq!(json["infinite_stall"], false);
    }

    #[tokio::test]
    async fn test_rejects_bad_failure_kind() {
        let sniffles = Sniffles::new();
        let (status, json) = send(
            &sniffles,
            json_request(
                Method::PUT,
                "/__sniffles/failure",
                r#"{"enabled": true, "kind": "dns"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["error"].as_str().unwrap().contains("kind"));
        assert!(!sniffles.policy().failure_enabled);
    }

    #[tokio::test]
    async fn test_rejects_malformed_and_untyped_bodies() {
        let sniffles = Sniffles::new();

        let (status, json) = send(
            &sniffles,
            json_request(Method::PUT, "/__sniffles/delay", "{not json"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let request = Request::builder()
            .method(Method::PUT)
            .uri("/__sniffles/stall")
            .body(Body::from(r#"{"enabled": true}"#))
            .unwrap();
        let (status, json) = send(&sniffles, request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(json["error"].is_string());
        assert!(!sniffles.policy().infinite_stall);
    }

    #[tokio::test]
    async fn test_history_and_last() {
        let sniffles = Sniffles::new();
        seed(&sniffles, "http://api.test/one").await;
        seed(&sniffles, "http://api.test/two").await;

        let (status, json) = send(
            &sniffles,
            json_request(Method::GET, "/__sniffles/history", ""),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["url"], "http://api.test/two");

        let (_, json) = send(&sniffles, json_request(Method::GET, "/__sniffles/last", "")).await;
        assert_eq!(json["last_request"]["url"], "http://api.test/two");
        assert_eq!(json["latest_record"]["status_code"], 200);

        let (status, _) = send(
            &sniffles,
            json_request(Method::DELETE, "/__sniffles/history", ""),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(sniffles.request_history().is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let sniffles = Sniffles::new();
        let response = router(&sniffles)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
