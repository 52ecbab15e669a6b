//! HTTP client for the payment authority's orders API.
//!
//! Speaks the Razorpay orders API: `POST {api_base}/orders` with basic auth
//! `key_id:key_secret` and a JSON body of amount (paise), currency and
//! receipt.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, instrument};
use url::Url;

use super::{AuthorityError, AuthorityOrder, AuthorityOrderRequest, PaymentAuthority};
use crate::config::PaymentConfig;

/// Payment authority client over HTTPS.
#[derive(Clone)]
pub struct HttpPaymentAuthority {
    client: Client,
    api_base: Url,
    key_id: String,
    key_secret: SecretString,
}

impl std::fmt::Debug for HttpPaymentAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPaymentAuthority")
            .field("api_base", &self.api_base.as_str())
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl HttpPaymentAuthority {
    /// Build a client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::Request` if the HTTP client cannot be built.
    pub fn new(config: &PaymentConfig) -> Result<Self, AuthorityError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthorityError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentAuthority for HttpPaymentAuthority {
    #[instrument(skip(self, request), fields(receipt = %request.receipt, amount = request.amount))]
    async fn create_order(
        &self,
        request: &AuthorityOrderRequest,
    ) -> Result<AuthorityOrder, AuthorityError> {
        if request.amount <= 0 {
            return Err(AuthorityError::Amount(format!(
                "amount must be positive (got {})",
                request.amount
            )));
        }

        let response = self
            .client
            .post(self.endpoint("orders"))
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthorityError::Request("request timed out".to_string())
                } else {
                    AuthorityError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body
                    .error
                    .description
                    .or(body.error.code)
                    .unwrap_or_else(|| "unknown error".to_string()),
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
            };
            error!(status = status.as_u16(), %message, "Payment authority rejected order");
            return Err(AuthorityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let order: AuthorityOrder = response
            .json()
            .await
            .map_err(|e| AuthorityError::Response(e.to_string()))?;

        if order.amount != request.amount {
            return Err(AuthorityError::Response(format!(
                "amount mismatch: sent {}, authority recorded {}",
                request.amount, order.amount
            )));
        }

        debug!(authority_order_id = %order.id, "Payment authority order created");
        Ok(order)
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use marigold_core::CurrencyCode;

    use super::*;

    fn config(base: &str) -> PaymentConfig {
        PaymentConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: SecretString::from("hidden"),
            api_base: Url::parse(base).unwrap(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = HttpPaymentAuthority::new(&config("https://api.razorpay.com/v1/")).unwrap();
        assert_eq!(client.endpoint("orders"), "https://api.razorpay.com/v1/orders");
        assert_eq!(client.key_id(), "rzp_test_key");
    }

    #[test]
    fn test_request_body_shape() {
        let request = AuthorityOrderRequest {
            amount: 26_250,
            currency: CurrencyCode::INR,
            receipt: "rcpt_1".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"amount": 26250, "currency": "INR", "receipt": "rcpt_1"})
        );
    }

    #[test]
    fn test_error_body_decoding() {
        let body: ApiErrorBody = serde_json::from_str(
            r#"{"error": {"code": "BAD_REQUEST_ERROR", "description": "amount too small"}}"#,
        )
        .unwrap();
        assert_eq!(body.error.description.as_deref(), Some("amount too small"));
    }

    #[tokio::test]
    async fn test_unreachable_authority_is_request_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = HttpPaymentAuthority::new(&config("http://127.0.0.1:9/v1")).unwrap();
        let request = AuthorityOrderRequest {
            amount: 100,
            currency: CurrencyCode::INR,
            receipt: "rcpt".to_string(),
        };
        let result = client.create_order(&request).await;
        assert!(matches!(result, Err(AuthorityError::Request(_))));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amount() {
        let client = HttpPaymentAuthority::new(&config("http://127.0.0.1:9/v1")).unwrap();
        let request = AuthorityOrderRequest {
            amount: 0,
            currency: CurrencyCode::INR,
            receipt: "rcpt".to_string(),
        };
        assert!(matches!(
            client.create_order(&request).await,
            Err(AuthorityError::Amount(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let client = HttpPaymentAuthority::new(&config("https://api.razorpay.com/v1")).unwrap();
        let output = format!("{client:?}");
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("hidden"));
    }
}
