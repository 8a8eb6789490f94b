//! HTTP client for the processor API.

use super::{
    Balance, CancelResult, CreatedOrder, OrderStatusReport, PaymentProcessor, Payout,
    ProcessorError, ProcessorOrderStatus, Result, decimal_from_json, id_from_json,
};
use crate::config::ProcessorConfig;
use crate::domain::PaymentType;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

const GET_REQUISITE: &str = "/get_requisite";
const GET_STATUS: &str = "/get_status";
const CANCEL_ORDER: &str = "/cancel_order";
const GET_BALANCE: &str = "/get_balance";
const CREATE_PAYOUT: &str = "/create_payout";
const PAYOUT_STATUS: &str = "/payout_status";

/// Which key authenticates a call.
#[derive(Debug, Clone, Copy)]
enum Credentials {
    /// Order calls.
    Secret,
    /// Balance and payout calls.
    Payment,
}

/// Processor client speaking JSON over HTTP.
/// Every call is a POST carrying the credentials in the body.
pub struct LiveProcessor {
    http_client: HttpClient,
    base_url: String,
    api_id: String,
    secret_key: String,
    payment_key: String,
    retries: u32,
}

impl LiveProcessor {
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_id: config.api_id.clone(),
            secret_key: config.secret_key.clone(),
            payment_key: config.payment_key.clone(),
            retries: config.retries,
        })
    }

    /// Sends a request, retrying transport failures up to `retries` times.
    async fn call(
        &self,
        endpoint: &str,
        credentials: Credentials,
        fields: Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let mut body = fields;
        body.insert("api_id".to_string(), Value::String(self.api_id.clone()));
        match credentials {
            Credentials::Secret => {
                body.insert("secret_key".to_string(), Value::String(self.secret_key.clone()))
            }
            Credentials::Payment => body.insert(
                "payment_key".to_string(),
                Value::String(self.payment_key.clone()),
            ),
        };
        let body = Value::Object(body);

        let mut attempt = 0;
        loop {
            match self.send_once(endpoint, &body).await {
                Err(ProcessorError::Transport(message)) if attempt < self.retries => {
                    attempt += 1;
                    warn!(endpoint, attempt, error = %message, "Processor request failed, retrying");
                }
                result => return result,
            }
        }
    }

    async fn send_once(&self, endpoint: &str, body: &Value) -> Result<Map<String, Value>> {
        let url = format!("{}{}", self.base_url, endpoint);

        debug!(endpoint, "sending processor request");

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        let parsed = serde_json::from_slice::<Value>(&bytes).ok();

        if let Some(message) = parsed.as_ref().and_then(business_error) {
            warn!(endpoint, error = %message, "Processor rejected request");
            return Err(ProcessorError::Business(message));
        }

        if status.is_server_error() {
            return Err(ProcessorError::Transport(format!("status {}", status)));
        }

        if !status.is_success() {
            return Err(ProcessorError::Business(format!(
                "status {}: {}",
                status,
                String::from_utf8_lossy(&bytes)
            )));
        }

        match parsed {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(ProcessorError::InvalidResponse(format!(
                "expected object, got {}",
                other
            ))),
            None => Err(ProcessorError::InvalidResponse(
                "body is not JSON".to_string(),
            )),
        }
    }
}

/// A non-null `error` field marks a rejected request.
fn business_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn amount_value(amount: Decimal) -> Value {
    let amount = amount.round_dp(2);
    amount
        .to_f64()
        .map(Value::from)
        .unwrap_or_else(|| Value::String(amount.to_string()))
}

fn required_str(body: &Map<String, Value>, field: &str) -> Result<String> {
    body.get(field)
        .and_then(id_from_json)
        .ok_or_else(|| ProcessorError::InvalidResponse(format!("missing {}", field)))
}

fn optional_str(body: &Map<String, Value>, field: &str) -> String {
    body.get(field).and_then(id_from_json).unwrap_or_default()
}

/// Parses a `/get_requisite` response. Card and SBP requisites use different field names.
pub(super) fn parse_created_order(
    body: &Map<String, Value>,
    requested: PaymentType,
) -> Result<CreatedOrder> {
    let payment_type = match body.get("payment_type").and_then(Value::as_str) {
        Some("card") => PaymentType::Card,
        Some("sbp") => PaymentType::Sbp,
        _ => requested,
    };

    let (requisite, owner_name) = match payment_type {
        PaymentType::Card => (
            required_str(body, "card_number")?,
            optional_str(body, "cardholder_name"),
        ),
        PaymentType::Sbp => (
            required_str(body, "phone")?,
            optional_str(body, "recipient_name"),
        ),
    };

    Ok(CreatedOrder {
        processor_order_id: required_str(body, "id")?,
        payment_type,
        requisite,
        owner_name,
        bank_name: optional_str(body, "bank"),
    })
}

pub(super) fn parse_status_report(body: &Map<String, Value>) -> Result<OrderStatusReport> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| ProcessorError::InvalidResponse("missing status".to_string()))?;

    let received_amount = body
        .get("received_amount")
        .or_else(|| body.get("received_sum"))
        .and_then(decimal_from_json);

    Ok(OrderStatusReport {
        status: ProcessorOrderStatus::parse(status),
        received_amount,
    })
}

#[async_trait]
impl PaymentProcessor for LiveProcessor {
    async fn create_order(
        &self,
        amount: Decimal,
        payment_type: PaymentType,
        external_ref: &str,
        is_test: bool,
    ) -> Result<CreatedOrder> {
        let mut fields = Map::new();
        fields.insert("amount_rub".to_string(), amount_value(amount));
        fields.insert("payment_type".to_string(), json!(payment_type.to_string()));
        fields.insert("personal_id".to_string(), json!(external_ref));
        if is_test {
            fields.insert("trans".to_string(), json!("true"));
        }

        let body = self.call(GET_REQUISITE, Credentials::Secret, fields).await?;
        parse_created_order(&body, payment_type)
    }

    async fn get_order_status(&self, processor_order_id: &str) -> Result<OrderStatusReport> {
        let mut fields = Map::new();
        fields.insert("id".to_string(), json!(processor_order_id));

        let body = self.call(GET_STATUS, Credentials::Secret, fields).await?;
        parse_status_report(&body)
    }

    async fn cancel_order(&self, processor_order_id: &str) -> Result<CancelResult> {
        let mut fields = Map::new();
        fields.insert("id".to_string(), json!(processor_order_id));

        let body = self.call(CANCEL_ORDER, Credentials::Secret, fields).await?;

        let cancelled = body.get("status").and_then(Value::as_str) == Some("cancelled")
            || body.get("success").and_then(Value::as_bool) == Some(true);

        Ok(CancelResult { cancelled })
    }

    async fn get_balance(&self) -> Result<Balance> {
        let body = self
            .call(GET_BALANCE, Credentials::Payment, Map::new())
            .await?;

        let balance = body
            .get("balance")
            .and_then(decimal_from_json)
            .ok_or_else(|| ProcessorError::InvalidResponse("missing balance".to_string()))?;

        Ok(Balance { balance })
    }

    async fn create_payout(
        &self,
        kind: PaymentType,
        amount: Decimal,
        requisite: &str,
        bank: &str,
        external_ref: &str,
    ) -> Result<Payout> {
        let mut fields = Map::new();
        fields.insert("type".to_string(), json!(kind.to_string()));
        fields.insert("amount".to_string(), amount_value(amount));
        fields.insert("requisite".to_string(), json!(requisite));
        fields.insert("bank".to_string(), json!(bank));
        fields.insert("personal_id".to_string(), json!(external_ref));

        let body = self.call(CREATE_PAYOUT, Credentials::Payment, fields).await?;

        Ok(Payout {
            payout_id: required_str(&body, "id")?,
            status: required_str(&body, "status")?,
        })
    }

    async fn get_payout_status(&self, payout_id: &str) -> Result<String> {
        let mut fields = Map::new();
        fields.insert("id".to_string(), json!(payout_id));

        let body = self.call(PAYOUT_STATUS, Credentials::Payment, fields).await?;
        required_str(&body, "status")
    }

    fn name(&self) -> &str {
        "live"
    }
}
