use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{NotificationPayload, NotificationSender, SendOutcome};

const FCM_API_BASE: &str = "https://fcm.googleapis.com/v1/projects";

/// Firebase Cloud Messaging over the HTTP v1 API with a pre-issued OAuth
/// bearer token.
pub struct FcmSender {
    endpoint: String,
    access_token: String,
    http: reqwest::Client,
}

impl FcmSender {
    pub fn new(
        project_id: &str,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: format!("{FCM_API_BASE}/{project_id}/messages:send"),
            access_token: access_token.into(),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.access_token))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

fn request_body(token: &str, payload: &NotificationPayload) -> Value {
    json!({
        "message": {
            "token": token,
            "notification": {
                "title": payload.title,
                "body": payload.body,
            },
            "data": payload.data,
        }
    })
}

/// Map an FCM response to an outcome.
///
/// `UNREGISTERED` (404) and `INVALID_ARGUMENT` (400) mean the token itself
/// is bad. Everything else, including auth problems on our side, is retried
/// on a later run.
fn classify(status: u16, body: &str) -> SendOutcome {
    if (200..300).contains(&status) {
        return SendOutcome::Delivered;
    }
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = &parsed["error"];
    let error_status = error["status"].as_str().unwrap_or_default();
    let error_code = error["details"]
        .as_array()
        .into_iter()
        .flatten()
        .find_map(|d| d["errorCode"].as_str())
        .unwrap_or_default();
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"));

    let permanent = matches!(error_code, "UNREGISTERED" | "INVALID_ARGUMENT")
        || (status == 404 && error_status == "NOT_FOUND")
        || (status == 400 && error_status == "INVALID_ARGUMENT");
    if permanent {
        SendOutcome::PermanentFailure(message)
    } else {
        SendOutcome::TransientFailure(message)
    }
}

#[async_trait]
impl NotificationSender for FcmSender {
    async fn send(&self, token: &str, payload: &NotificationPayload) -> SendOutcome {
        let headers = match self.headers() {
            Ok(h) => h,
            Err(e) => return SendOutcome::TransientFailure(format!("bad credentials: {e}")),
        };
        let response = match self
            .http
            .post(&self.endpoint)
            .headers(headers)
            .json(&request_body(token, payload))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "FCM request failed");
                return SendOutcome::TransientFailure(e.to_string());
            }
        };
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let outcome = classify(status, &body);
        debug!(status, ?outcome, "FCM response");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn unregistered_token_is_permanent() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND",
            "details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;
        assert_eq!(
            classify(404, body),
            SendOutcome::PermanentFailure("Requested entity was not found.".into())
        );
    }

    #[test]
    fn malformed_token_is_permanent() {
        let body = r#"{"error":{"code":400,"message":"The registration token is not a valid FCM registration token","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(classify(400, body), SendOutcome::PermanentFailure(_)));
    }

    #[test]
    fn quota_and_server_errors_are_transient() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(classify(429, body), SendOutcome::TransientFailure("Quota exceeded".into()));
        assert_eq!(classify(503, "<html>"), SendOutcome::TransientFailure("HTTP 503".into()));
        assert!(matches!(classify(401, "{}"), SendOutcome::TransientFailure(_)));
    }

    #[test]
    fn success_is_delivered() {
        assert_eq!(classify(200, r#"{"name":"projects/p/messages/1"}"#), SendOutcome::Delivered);
    }

    #[test]
    fn data_values_go_out_as_strings() {
        let payload = NotificationPayload {
            title: "Sofia: water".into(),
            body: "No water".into(),
            data: BTreeMap::from([("distance".to_string(), "120".to_string())]),
        };
        let body = request_body("tok", &payload);
        assert_eq!(body["message"]["data"]["distance"], "120");
        assert_eq!(body["message"]["token"], "tok");
    }
}
