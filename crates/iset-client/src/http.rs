//! HTTP implementation of `ChatBackend` on top of `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use iset_core::config::BackendConfig;
use iset_core::error::{IsetError, RemoteError};
use iset_core::remote::ChatBackend;
use iset_core::types::SessionId;
use iset_core::wire::{
    CandidatesReply, ChatReply, ChatRequest, DeleteChatRequest, IntegrateReply, IntegrateRequest,
    LearningStatus, NewChatReply, RateRequest, WireCandidate, WireSession,
};

const PATH_SESSIONS: &str = "get_sessions";
const PATH_NEW_CHAT: &str = "new_chat";
const PATH_DELETE_CHAT: &str = "delete_chat";
const PATH_CHAT: &str = "api/chat";
const PATH_RATE: &str = "rate";
const PATH_LEARNING_STATUS: &str = "api/self-learning/status";
const PATH_CANDIDATES: &str = "api/self-learning/candidates";
const PATH_INTEGRATE: &str = "api/self-learning/integrate";

/// Backend client for the assistant's JSON API.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    /// Build a client from backend settings.
    ///
    /// Fails if the base URL does not parse or the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, IsetError> {
        let base_url = parse_base_url(&config.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| IsetError::Config(format!("cannot build HTTP client: {e}")))?;
        tracing::debug!(base_url = %base_url, "HTTP backend configured");
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path)
            .map_err(|e| RemoteError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, "GET");
        let resp = self.client.get(url).send().await.map_err(map_reqwest)?;
        decode(resp).await
    }

    async fn post<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, "POST");
        let mut req = self.client.post(url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(map_reqwest)?;
        decode(resp).await
    }
}

/// Normalise the configured base URL so relative joins keep its path.
fn parse_base_url(raw: &str) -> Result<Url, IsetError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash)
        .map_err(|e| IsetError::Config(format!("invalid backend.base_url {raw:?}: {e}")))
}

fn map_reqwest(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else if err.is_decode() {
        RemoteError::Decode(err.to_string())
    } else {
        RemoteError::Transport(err.to_string())
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, RemoteError> {
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(map_reqwest)?;
    let value = interpret(status, &body)?;
    serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Turn a status code and raw body into JSON or a `RemoteError`.
///
/// The backend reports failures as `{"status": "error", "message": ...}`,
/// usually with a 4xx/5xx code but not always.
fn interpret(status: u16, body: &str) -> Result<Value, RemoteError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if !(200..300).contains(&status) {
        return Err(RemoteError::Status {
            code: status,
            message: message.unwrap_or_else(|| body.trim().chars().take(200).collect()),
        });
    }

    let value = parsed.ok_or_else(|| RemoteError::Decode("response is not JSON".into()))?;
    if value.get("status").and_then(Value::as_str) == Some("error") {
        return Err(RemoteError::Rejected(
            message.unwrap_or_else(|| "unspecified error".into()),
        ));
    }
    Ok(value)
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn list_sessions(&self) -> Result<Vec<WireSession>, RemoteError> {
        self.get(PATH_SESSIONS).await
    }

    async fn new_chat(&self) -> Result<SessionId, RemoteError> {
        let reply: NewChatReply = self.post::<Value, _>(PATH_NEW_CHAT, None).await?;
        Ok(reply.session_id)
    }

    async fn delete_chat(&self, id: SessionId) -> Result<(), RemoteError> {
        let body = DeleteChatRequest { session_id: id };
        let _: Value = self.post(PATH_DELETE_CHAT, Some(&body)).await?;
        Ok(())
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, RemoteError> {
        self.post(PATH_CHAT, Some(request)).await
    }

    async fn rate(&self, request: &RateRequest) -> Result<(), RemoteError> {
        let _: Value = self.post(PATH_RATE, Some(request)).await?;
        Ok(())
    }

    async fn learning_status(&self) -> Result<LearningStatus, RemoteError> {
        self.get(PATH_LEARNING_STATUS).await
    }

    async fn candidates(&self) -> Result<Vec<WireCandidate>, RemoteError> {
        let reply: CandidatesReply = self.get(PATH_CANDIDATES).await?;
        Ok(reply.candidates)
    }

    async fn integrate(&self, request: &IntegrateRequest) -> Result<IntegrateReply, RemoteError> {
        self.post(PATH_INTEGRATE, Some(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(&BackendConfig {
            base_url: base.to_string(),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_without_trailing_slash() {
        let b = backend("http://localhost:5000");
        assert_eq!(
            b.endpoint(PATH_CHAT).unwrap().as_str(),
            "http://localhost:5000/api/chat"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let b = backend("http://example.test/chatbot/");
        assert_eq!(
            b.endpoint(PATH_INTEGRATE).unwrap().as_str(),
            "http://example.test/chatbot/api/self-learning/integrate"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = HttpBackend::new(&BackendConfig {
            base_url: "not a url".into(),
            request_timeout_secs: 5,
        })
        .unwrap_err();
        assert!(matches!(err, IsetError::Config(_)));
    }

    #[test]
    fn test_interpret_server_error_uses_message() {
        let err = interpret(
            500,
            r#"{"status":"error","message":"Internal server error"}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Status {
                code: 500,
                message: "Internal server error".into()
            }
        );
    }

    #[test]
    fn test_interpret_non_json_error_body() {
        let err = interpret(502, "Bad Gateway\n").unwrap_err();
        assert_eq!(
            err,
            RemoteError::Status {
                code: 502,
                message: "Bad Gateway".into()
            }
        );
    }

    #[test]
    fn test_interpret_error_status_in_ok_body() {
        let err = interpret(200, r#"{"status":"error","message":"session_id manquant."}"#)
            .unwrap_err();
        assert_eq!(err, RemoteError::Rejected("session_id manquant.".into()));
    }

    #[test]
    fn test_interpret_success() {
        let value = interpret(200, r#"{"status":"success","session_id":4}"#).unwrap();
        let reply: NewChatReply = serde_json::from_value(value).unwrap();
        assert_eq!(reply.session_id, SessionId(4));
    }

    #[test]
    fn test_interpret_rejects_non_json_success() {
        assert!(matches!(
            interpret(200, "<html>"),
            Err(RemoteError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Port 9 (discard) on localhost is essentially never listening.
        let b = backend("http://127.0.0.1:9");
        let err = b.list_sessions().await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Transport(_) | RemoteError::Timeout
        ));
    }
}
