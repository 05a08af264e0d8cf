//! Paystack REST client.
//!
//! The secret key is passed in by the caller; do not log it.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{GatewayError, InitializeRequest, InitializedTransaction, PaymentGateway};
use crate::domain::aggregates::{GatewayOutcome, GatewayStatus};

pub const DEFAULT_BASE_URL: &str = "https://api.paystack.co";

#[derive(Clone)]
pub struct PaystackClient {
    secret_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for PaystackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaystackClient")
            .field("secret_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PaystackClient {
    pub fn new(secret_key: String) -> Self {
        Self::new_with_base_url(secret_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn new_with_base_url(secret_key: String, base_url: String) -> Self {
        Self { secret_key, http: reqwest::Client::new(), base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// `/transaction/verify/<reference>` with the reference as one escaped path segment.
    fn verify_url(&self, reference: &str) -> Result<reqwest::Url, GatewayError> {
        if reference.is_empty() || reference.chars().all(|c| c == '.') {
            return Err(GatewayError::UnknownReference(reference.to_string()));
        }
        let mut url = reqwest::Url::parse(&self.url("/transaction/verify")).map_err(|e| GatewayError::Transport(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Transport(format!("base url {} cannot carry a path", self.base_url)))?
            .push(reference);
        Ok(url)
    }

    async fn read<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<Envelope<T>, GatewayError> {
        let status = resp.status();
        let text = resp.text().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<Envelope<Value>>(&text).map(|e| e.message).unwrap_or(text);
            return Err(GatewayError::Rejected { status: status.as_u16(), message });
        }
        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))?;
        if !envelope.status {
            return Err(GatewayError::Rejected { status: status.as_u16(), message: envelope.message });
        }
        Ok(envelope)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for PaystackClient {
    fn name(&self) -> &'static str {
        "paystack"
    }

    async fn initialize(&self, req: InitializeRequest) -> Result<InitializedTransaction, GatewayError> {
        let mut body = json!({
            "email": req.email,
            "amount": req.amount,
            "currency": req.currency,
            "reference": req.reference,
            "metadata": { "order_id": req.order_id, "order_number": req.order_number },
        });
        if let Some(callback) = req.callback_url {
            body["callback_url"] = Value::String(callback);
        }
        let resp = self
            .http
            .post(self.url("/transaction/initialize"))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let data = self.read::<InitializeData>(resp).await?.data.ok_or_else(|| GatewayError::Decode("missing data".into()))?;
        Ok(InitializedTransaction { authorization_url: data.authorization_url, access_code: data.access_code, reference: data.reference })
    }

    async fn verify(&self, reference: &str) -> Result<GatewayOutcome, GatewayError> {
        let resp = self
            .http
            .get(self.verify_url(reference)?)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let envelope = match self.read::<PaystackTransaction>(resp).await {
            Err(GatewayError::Rejected { message, .. }) if message.to_lowercase().contains("not found") => {
                return Err(GatewayError::UnknownReference(reference.to_string()));
            }
            other => other?,
        };
        let data = envelope.data.ok_or_else(|| GatewayError::Decode("missing data".into()))?;
        Ok(data.into_outcome())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

/// A transaction as Paystack reports it, in verify responses and webhook payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackTransaction {
    pub reference: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    pub channel: Option<String>,
    pub gateway_response: Option<String>,
    #[serde(alias = "paidAt")]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl PaystackTransaction {
    pub fn into_outcome(self) -> GatewayOutcome {
        let order_id = metadata_order_id(&self.metadata);
        let paid_at = self
            .paid_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        GatewayOutcome {
            status: GatewayStatus::parse(&self.status),
            raw_status: self.status,
            reference: self.reference,
            amount: self.amount,
            currency: self.currency.to_uppercase(),
            channel: self.channel,
            gateway_response: self.gateway_response,
            paid_at,
            order_id,
        }
    }
}

/// A webhook delivery body.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackEvent {
    pub event: String,
    pub data: PaystackTransaction,
}

impl PaystackEvent {
    /// Events that carry a transaction outcome worth reconciling.
    pub fn is_charge_outcome(&self) -> bool {
        matches!(self.event.as_str(), "charge.success" | "charge.failed")
    }
}

/// Metadata arrives as an object, a JSON-encoded string, or an empty string.
fn metadata_order_id(metadata: &Value) -> Option<Uuid> {
    let object = match metadata {
        Value::String(s) => serde_json::from_str::<Value>(s).ok()?,
        other => other.clone(),
    };
    object.get("order_id")?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_metadata_shapes() {
        let id = Uuid::now_v7();
        assert_eq!(metadata_order_id(&json!({ "order_id": id.to_string() })), Some(id));
        assert_eq!(metadata_order_id(&json!(format!("{{\"order_id\":\"{}\"}}", id))), Some(id));
        assert_eq!(metadata_order_id(&json!("")), None);
        assert_eq!(metadata_order_id(&Value::Null), None);
    }

    #[test]
    fn test_webhook_payload_into_outcome() {
        let raw = json!({
            "event": "charge.success",
            "data": {
                "id": 302961, "reference": "TRD-00000001-ABC123", "status": "success", "amount": 1650000,
                "currency": "NGN", "channel": "card", "gateway_response": "Approved",
                "paid_at": "2024-03-02T10:15:30.000Z", "metadata": ""
            }
        });
        let event: PaystackEvent = serde_json::from_value(raw).unwrap();
        assert!(event.is_charge_outcome());
        let outcome = event.data.into_outcome();
        assert_eq!(outcome.status, GatewayStatus::Success);
        assert_eq!(outcome.amount, 1_650_000);
        assert!(outcome.paid_at.is_some());
        assert!(outcome.order_id.is_none());
    }

    #[tokio::test]
    async fn test_initialize_sends_bearer_and_metadata() {
        let server = MockServer::start_async().await;
        let order_id = Uuid::now_v7();
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/transaction/initialize")
                    .header("authorization", "Bearer sk_test_123")
                    .json_body_partial(format!(r#"{{"amount": 500000, "reference": "R-1", "metadata": {{"order_id": "{}"}}}}"#, order_id));
                then.status(200).json_body(json!({
                    "status": true, "message": "Authorization URL created",
                    "data": { "authorization_url": "https://checkout.paystack.com/abc", "access_code": "abc", "reference": "R-1" }
                }));
            })
            .await;

        let client = PaystackClient::new_with_base_url("sk_test_123".into(), server.base_url());
        let tx = client
            .initialize(InitializeRequest {
                email: "ada@example.com".into(), amount: 500_000, currency: "NGN".into(), reference: "R-1".into(),
                callback_url: None, order_id, order_number: "TRD-00000001".into(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(tx.authorization_url, "https://checkout.paystack.com/abc");
        assert_eq!(tx.reference, "R-1");
    }

    #[tokio::test]
    async fn test_verify_maps_statuses_and_missing_references() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/transaction/verify/R-ok");
                then.status(200).json_body(json!({
                    "status": true, "message": "Verification successful",
                    "data": { "reference": "R-ok", "status": "abandoned", "amount": 1000, "currency": "ngn",
                              "channel": null, "gateway_response": "The transaction was not completed", "paid_at": null,
                              "metadata": { "order_id": "not-a-uuid" } }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/transaction/verify/R-missing");
                then.status(400).json_body(json!({ "status": false, "message": "Transaction reference not found" }));
            })
            .await;

        let client = PaystackClient::new_with_base_url("sk".into(), server.base_url());
        let outcome = client.verify("R-ok").await.unwrap();
        assert_eq!(outcome.status, GatewayStatus::Abandoned);
        assert_eq!(outcome.currency, "NGN");
        assert!(outcome.order_id.is_none());

        let err = client.verify("R-missing").await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownReference(r) if r == "R-missing"));
    }

    #[tokio::test]
    async fn test_verify_keeps_reference_inside_one_segment() {
        let server = MockServer::start_async().await;
        let customer = server
            .mock_async(|when, then| {
                when.method(GET).path("/customer");
                then.status(200).json_body(json!({ "status": true, "message": "Customers retrieved", "data": [] }));
            })
            .await;

        let client = PaystackClient::new_with_base_url("sk".into(), server.base_url());
        assert!(client.verify("../../customer").await.is_err());
        assert_eq!(customer.hits_async().await, 0);

        assert!(matches!(client.verify("..").await, Err(GatewayError::UnknownReference(_))));
        assert_eq!(customer.hits_async().await, 0);
    }

    #[test]
    fn test_verify_url_escapes_separators() {
        let client = PaystackClient::new_with_base_url("sk".into(), "http://gateway.local/v1/".into());
        let url = client.verify_url("a/b?c#d").unwrap();
        assert_eq!(url.as_str(), "http://gateway.local/v1/transaction/verify/a%2Fb%3Fc%23d");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let client = PaystackClient::new("sk_live_very_secret".into());
        assert!(!format!("{:?}", client).contains("very_secret"));
    }
}
