use crate::core::event_queue::OrchestratorHandle;
use crate::domain::model::{
    AuthorizationStatus, CartSource, PaymentAuthorization, WalletContact,
};
use crate::utils::error::{CheckoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A recorded wallet sheet session: where the cart comes from and the
/// callbacks the sheet produced, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventScript {
    pub cart: Option<CartSource>,
    #[serde(default)]
    pub events: Vec<ScriptedEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ScriptedEvent {
    SheetPresented,
    ContactSelected {
        contact: WalletContact,
    },
    ShippingMethodSelected {
        identifier: String,
    },
    PaymentAuthorized {
        authorization: PaymentAuthorization,
    },
    UserCancelled,
}

impl EventScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Starts from an existing cart instead of the scripted source.
    pub fn with_cart_id(mut self, cart_id: Option<&str>) -> Self {
        if let Some(cart_id) = cart_id {
            self.cart = Some(CartSource::Existing {
                cart_id: cart_id.to_string(),
            });
        }
        self
    }

    /// Feeds the script through a running session. Stops early once the
    /// sheet is no longer open.
    pub async fn replay(&self, handle: &OrchestratorHandle) -> Result<()> {
        let source = self.cart.clone().ok_or_else(|| CheckoutError::MissingFieldError {
            field: "cart".to_string(),
        })?;

        if !handle.start(source).await? {
            tracing::warn!("Wallet sheet did not open, skipping {} event(s)", self.events.len());
            return Ok(());
        }

        for (index, event) in self.events.iter().enumerate() {
            tracing::debug!("Replaying event #{}", index + 1);
            match event {
                ScriptedEvent::SheetPresented => {
                    handle.sheet_presented().await?;
                }
                ScriptedEvent::ContactSelected { contact } => {
                    let update = handle.contact_selected(contact.clone()).await?;
                    tracing::info!(
                        "📮 Contact applied: {} shipping method(s), {} field error(s)",
                        update.shipping_methods.len(),
                        update.errors.len()
                    );
                }
                ScriptedEvent::ShippingMethodSelected { identifier } => {
                    let update = handle.shipping_method_selected(identifier.as_str()).await?;
                    if let Some(total) = update.summary.last() {
                        tracing::info!(
                            "🚚 Shipping method {} applied, total {} {}",
                            identifier,
                            total.amount.amount,
                            total.amount.currency_code
                        );
                    }
                }
                ScriptedEvent::PaymentAuthorized { authorization } => {
                    let result = handle.payment_authorized(authorization.clone()).await?;
                    match result.status {
                        AuthorizationStatus::Success => tracing::info!("💳 Payment authorized"),
                        AuthorizationStatus::Failure if result.errors.is_empty() => {
                            tracing::warn!("Payment authorization ended without submission")
                        }
                        AuthorizationStatus::Failure => tracing::warn!(
                            "Payment authorization returned {} field error(s)",
                            result.errors.len()
                        ),
                        AuthorizationStatus::UndefinedFailure => {
                            tracing::warn!("Payment authorization was not processed")
                        }
                    }
                }
                ScriptedEvent::UserCancelled => handle.user_cancelled(),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let script = EventScript::from_json_str(
            r#"{
                "cart": { "type": "lines", "lines": [{ "merchandiseId": "gid://shop/ProductVariant/1", "quantity": 2 }] },
                "events": [
                    { "event": "contactSelected", "contact": { "givenName": "Ada", "postalAddress": { "city": "Toronto", "isoCountryCode": "CA" } } },
                    { "event": "shippingMethodSelected", "identifier": "standard" },
                    { "event": "userCancelled" }
                ]
            }"#,
        )
        .unwrap();

        assert!(matches!(script.cart, Some(CartSource::Lines { ref lines, .. }) if lines[0].quantity == 2));
        assert_eq!(script.events.len(), 3);
        assert_eq!(
            script.events[1],
            ScriptedEvent::ShippingMethodSelected {
                identifier: "standard".to_string()
            }
        );
        assert_eq!(script.events[2], ScriptedEvent::UserCancelled);
    }

    #[test]
    fn test_cart_id_overrides_scripted_source() {
        let script = EventScript::from_json_str(r#"{ "events": [] }"#)
            .unwrap()
            .with_cart_id(Some("gid://shop/Cart/abc"));

        assert_eq!(
            script.cart,
            Some(CartSource::Existing {
                cart_id: "gid://shop/Cart/abc".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_json_is_a_serialization_error() {
        assert!(matches!(
            EventScript::from_json_str("not json"),
            Err(CheckoutError::SerializationError(_))
        ));
    }
}
