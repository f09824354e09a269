// Webhook body decoding
//
// The parsed JSON is kept verbatim so it can be echoed back to the sender; the
// typed event is only decoded once we know the run is worth reporting.

use serde::Deserialize;
use serde_json::Value;

use crate::error::PayloadError;
use crate::types::{WebhookEvent, RUNNING_STATUS};

/// A decoded webhook body.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPayload {
    raw: Value,
}

impl WebhookPayload {
    /// Parse the raw body. Only requires JSON with a `data` object.
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        let raw: Value = serde_json::from_slice(body).map_err(PayloadError::InvalidJson)?;
        if !raw.get("data").is_some_and(Value::is_object) {
            return Err(PayloadError::MissingData);
        }
        Ok(Self { raw })
    }

    /// `data.runStatus`, when present and a string.
    pub fn run_status(&self) -> Option<&str> {
        self.raw
            .get("data")
            .and_then(|data| data.get("runStatus"))
            .and_then(Value::as_str)
    }

    /// True while the job is still executing; such deliveries are acknowledged only.
    pub fn is_running(&self) -> bool {
        self.run_status() == Some(RUNNING_STATUS)
    }

    /// Decode the typed event, requiring every field the pipeline tags with.
    pub fn event(&self) -> Result<WebhookEvent, PayloadError> {
        let event = WebhookEvent::deserialize(&self.raw).map_err(PayloadError::InvalidEvent)?;
        if event.data.job_id == 0 {
            return Err(PayloadError::InvalidId { field: "jobId" });
        }
        if event.data.run_id == 0 {
            return Err(PayloadError::InvalidId { field: "runId" });
        }
        Ok(event)
    }

    pub fn into_json(self) -> Value {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(status: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "accountId": 1,
            "webhookName": "datadog",
            "eventType": "job.run.completed",
            "data": {
                "jobId": "123",
                "jobName": "nightly",
                "projectName": "analytics",
                "environmentName": "prod",
                "runId": "456",
                "runStatus": status,
                "runReason": "Kicked off from UI"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_running_detected() {
        let payload = WebhookPayload::parse(&body("Running")).unwrap();
        assert!(payload.is_running());

        let payload = WebhookPayload::parse(&body("Success")).unwrap();
        assert!(!payload.is_running());
        assert_eq!(payload.run_status(), Some("Success"));
    }

    #[test]
    fn test_missing_run_status_is_not_running() {
        let payload = WebhookPayload::parse(
            br#"{"webhookName":"x","data":{"jobId":"1","runId":"2","projectName":"P","environmentName":"E","jobName":"J","runReason":"R"}}"#,
        )
        .unwrap();
        assert_eq!(payload.run_status(), None);
        assert!(!payload.is_running());
        assert_eq!(payload.event().unwrap().data.run_status, None);

        let payload = WebhookPayload::parse(br#"{"data":{"runStatus":null}}"#).unwrap();
        assert!(!payload.is_running());
    }

    #[test]
    fn test_running_payload_needs_no_other_fields() {
        let payload =
            WebhookPayload::parse(br#"{"webhookName":"x","data":{"runStatus":"Running"}}"#)
                .unwrap();
        assert!(payload.is_running());
        assert!(payload.event().is_err());
    }

    #[test]
    fn test_event_decoded() {
        let payload = WebhookPayload::parse(&body("Errored")).unwrap();
        let event = payload.event().unwrap();
        assert_eq!(event.webhook_name, "datadog");
        assert_eq!(event.data.job_id, 123);
        assert_eq!(event.data.run_id, 456);
        assert_eq!(event.data.run_reason, "Kicked off from UI");
    }

    #[test]
    fn test_echo_keeps_input() {
        let raw = body("Success");
        let payload = WebhookPayload::parse(&raw).unwrap();
        assert_eq!(serde_json::to_vec(&payload.into_json()).unwrap(), raw);
    }

    #[test]
    fn test_invalid_bodies() {
        assert!(matches!(
            WebhookPayload::parse(b"not json"),
            Err(PayloadError::InvalidJson(_))
        ));
        assert!(matches!(
            WebhookPayload::parse(br#"{"webhookName":"x"}"#),
            Err(PayloadError::MissingData)
        ));
        assert!(matches!(
            WebhookPayload::parse(br#"{"data":"oops"}"#),
            Err(PayloadError::MissingData)
        ));
    }

    #[test]
    fn test_zero_ids_rejected() {
        let mut value: Value = serde_json::from_slice(&body("Success")).unwrap();
        value["data"]["runId"] = json!(0);
        let payload = WebhookPayload::parse(&serde_json::to_vec(&value).unwrap()).unwrap();
        assert!(matches!(
            payload.event(),
            Err(PayloadError::InvalidId { field: "runId" })
        ));
    }
}
