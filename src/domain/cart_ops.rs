//! Request and outcome types for cart operations.
//!
//! Update inputs keep "omitted" and "null" apart: empty strings handed to a
//! builder are dropped from the payload instead of being sent as `""` or
//! `null`.

use crate::domain::model::{Cart, CartAddress};
use crate::utils::error::{CheckoutError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

/// Buyer identity fields for `cartBuyerIdentityUpdate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerIdentityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country_code: Option<String>,
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl BuyerIdentityUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = non_empty(email);
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = non_empty(phone);
        self
    }

    pub fn customer_access_token(mut self, token: impl Into<String>) -> Self {
        self.customer_access_token = non_empty(token);
        self
    }

    pub fn country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = non_empty(country_code);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.phone.is_none()
            && self.customer_access_token.is_none()
            && self.country_code.is_none()
    }

    pub fn email_value(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_value(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}

/// Arguments for `cartDeliveryAddressesAdd`. Both flags default to `true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAddressInput {
    pub address: CartAddress,
    pub selected: bool,
    pub strict_validation: bool,
}

impl DeliveryAddressInput {
    pub fn new(address: CartAddress) -> Self {
        Self {
            address,
            selected: true,
            strict_validation: true,
        }
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrepareOutcome {
    Ready { cart: Box<Cart>, checkout_url: Url },
    NotReady { codes: Vec<String> },
    Throttled { poll_after: DateTime<Utc> },
}

impl PrepareOutcome {
    /// Unwraps the ready cart for callers that treat anything else as a
    /// failed request: not-ready and throttled outcomes become a
    /// `NetworkError` carrying the codes or the retry time. The wallet
    /// orchestrator matches the outcome itself, since it hands both cases
    /// to web checkout instead of failing.
    pub fn into_ready(self) -> Result<(Cart, Url)> {
        match self {
            PrepareOutcome::Ready { cart, checkout_url } => Ok((*cart, checkout_url)),
            PrepareOutcome::NotReady { codes } => Err(CheckoutError::network(format!(
                "Cart is not ready for completion: {}",
                join_codes(&codes)
            ))),
            PrepareOutcome::Throttled { poll_after } => Err(CheckoutError::network(format!(
                "Cart preparation throttled, retry after {}",
                poll_after.to_rfc3339()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Success {
        redirect_url: Url,
        attempt_id: String,
    },
    Failed {
        codes: Vec<String>,
        checkout_url: Option<Url>,
    },
    AlreadyAccepted {
        attempt_id: String,
    },
    Throttled {
        poll_after: DateTime<Utc>,
    },
}

impl SubmitOutcome {
    /// Unwraps the redirect URL; the other outcomes become a `NetworkError`.
    pub fn into_redirect_url(self) -> Result<Url> {
        match self {
            SubmitOutcome::Success { redirect_url, .. } => Ok(redirect_url),
            SubmitOutcome::Failed { codes, .. } => Err(CheckoutError::network(format!(
                "Cart submission failed: {}",
                join_codes(&codes)
            ))),
            SubmitOutcome::AlreadyAccepted { attempt_id } => Err(CheckoutError::network(
                format!("Cart submission already accepted (attempt {attempt_id})"),
            )),
            SubmitOutcome::Throttled { poll_after } => Err(CheckoutError::network(format!(
                "Cart submission throttled, retry after {}",
                poll_after.to_rfc3339()
            ))),
        }
    }
}

/// `MERCHANDISE_OUT_OF_STOCK` -> `merchandiseOutOfStock`.
pub fn camel_case_code(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for (index, word) in code.split('_').filter(|w| !w.is_empty()).enumerate() {
        let lower = word.to_lowercase();
        if index == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

fn join_codes(codes: &[String]) -> String {
    if codes.is_empty() {
        return "unknown".to_string();
    }
    codes
        .iter()
        .map(|c| camel_case_code(c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_buyer_identity_builder_omits_empty_strings() {
        let update = BuyerIdentityUpdate::new().email("").phone("+15555550100");
        let json = serde_json::to_value(&update).unwrap();

        assert_eq!(json, serde_json::json!({ "phone": "+15555550100" }));
        assert!(!update.is_empty());
    }

    #[test]
    fn test_buyer_identity_builder_all_empty() {
        let update = BuyerIdentityUpdate::new()
            .email("")
            .phone("  ")
            .customer_access_token("")
            .country_code("");
        assert!(update.is_empty());
        assert_eq!(serde_json::to_value(&update).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_camel_case_code() {
        assert_eq!(camel_case_code("MERCHANDISE_OUT_OF_STOCK"), "merchandiseOutOfStock");
        assert_eq!(camel_case_code("INVALID"), "invalid");
        assert_eq!(camel_case_code(""), "");
    }

    #[test]
    fn test_not_ready_becomes_network_error_with_joined_codes() {
        let outcome = PrepareOutcome::NotReady {
            codes: vec![
                "MERCHANDISE_NOT_ENOUGH_STOCK".to_string(),
                "DELIVERY_NO_DELIVERY_AVAILABLE".to_string(),
            ],
        };
        let err = outcome.into_ready().unwrap_err();
        match err {
            CheckoutError::NetworkError { message } => {
                assert_eq!(
                    message,
                    "Cart is not ready for completion: merchandiseNotEnoughStock, deliveryNoDeliveryAvailable"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_throttled_submit_becomes_network_error() {
        let poll_after = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let err = SubmitOutcome::Throttled { poll_after }
            .into_redirect_url()
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NetworkError { .. }));
        assert!(err.to_string().contains("2026-01-02T03:04:05"));
    }
}
