//! GraphQL documents for the cart API and the wire shapes they decode into.
//!
//! Inputs are written in the cart's vocabulary (`address1`, `province`,
//! `country`, `zip`, ...). The server drops fields it does not recognise
//! without complaint, so wallet-side names must never leak into a payload.

use crate::domain::cart_ops::{PrepareOutcome, SubmitOutcome};
use crate::domain::model::{
    BuyerIdentity, Cart, CartAddress, CartCost, CartDeliveryAddress, CartLine, DeliveryGroup,
    Money, PaymentContent, UserError,
};
use crate::utils::error::{CheckoutError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

macro_rules! cart_fragment {
    () => {
        r#"
fragment CartParts on Cart {
  id
  checkoutUrl
  buyerIdentity { email phone customerAccessToken countryCode }
  cost {
    subtotalAmount { amount currencyCode }
    totalAmount { amount currencyCode }
    totalTaxAmount { amount currencyCode }
  }
  lines(first: 250) {
    nodes {
      id
      quantity
      cost { totalAmount { amount currencyCode } }
      merchandise { id title product { title } }
    }
  }
  deliveryGroups(first: 25) {
    nodes {
      id
      deliveryOptions { ...DeliveryOptionParts }
      selectedDeliveryOption { ...DeliveryOptionParts }
    }
  }
  delivery {
    addresses {
      id
      selected
      address { firstName lastName address1 address2 city province country zip phone }
    }
  }
}

fragment DeliveryOptionParts on CartDeliveryOption {
  handle
  title
  code
  deliveryMethodType
  description
  estimatedCost { amount currencyCode }
}
"#
    };
}

macro_rules! user_errors {
    () => {
        "userErrors { field code message }"
    };
}

pub const CART_QUERY: &str = concat!(
    "query CartFetch($cartId: ID!) { cart(id: $cartId) { ...CartParts } }",
    cart_fragment!()
);

pub const CART_CREATE: &str = concat!(
    "mutation CartCreate($input: CartInput!) { cartCreate(input: $input) { cart { ...CartParts } ",
    user_errors!(),
    " } }",
    cart_fragment!()
);

pub const CART_BUYER_IDENTITY_UPDATE: &str = concat!(
    "mutation CartBuyerIdentityUpdate($cartId: ID!, $buyerIdentity: CartBuyerIdentityInput!) { ",
    "cartBuyerIdentityUpdate(cartId: $cartId, buyerIdentity: $buyerIdentity) { cart { ...CartParts } ",
    user_errors!(),
    " } }",
    cart_fragment!()
);

pub const CART_DELIVERY_ADDRESSES_ADD: &str = concat!(
    "mutation CartDeliveryAddressesAdd($cartId: ID!, $addresses: [CartSelectableAddressInput!]!) { ",
    "cartDeliveryAddressesAdd(cartId: $cartId, addresses: $addresses) { cart { ...CartParts } ",
    user_errors!(),
    " } }",
    cart_fragment!()
);

pub const CART_DELIVERY_ADDRESSES_REMOVE: &str = concat!(
    "mutation CartDeliveryAddressesRemove($cartId: ID!, $addressIds: [ID!]!) { ",
    "cartDeliveryAddressesRemove(cartId: $cartId, addressIds: $addressIds) { cart { ...CartParts } ",
    user_errors!(),
    " } }",
    cart_fragment!()
);

pub const CART_SELECTED_DELIVERY_OPTIONS_UPDATE: &str = concat!(
    "mutation CartSelectedDeliveryOptionsUpdate($cartId: ID!, $selectedDeliveryOptions: [CartSelectedDeliveryOptionInput!]!) { ",
    "cartSelectedDeliveryOptionsUpdate(cartId: $cartId, selectedDeliveryOptions: $selectedDeliveryOptions) { cart { ...CartParts } ",
    user_errors!(),
    " } }",
    cart_fragment!()
);

pub const CART_PAYMENT_UPDATE: &str = concat!(
    "mutation CartPaymentUpdate($cartId: ID!, $payment: CartPaymentInput!) { ",
    "cartPaymentUpdate(cartId: $cartId, payment: $payment) { cart { ...CartParts } ",
    user_errors!(),
    " } }",
    cart_fragment!()
);

pub const CART_BILLING_ADDRESS_UPDATE: &str = concat!(
    "mutation CartBillingAddressUpdate($cartId: ID!, $billingAddress: MailingAddressInput!) { ",
    "cartBillingAddressUpdate(cartId: $cartId, billingAddress: $billingAddress) { cart { ...CartParts } ",
    user_errors!(),
    " } }",
    cart_fragment!()
);

pub const CART_REMOVE_PERSONAL_DATA: &str = concat!(
    "mutation CartRemovePersonalData($cartId: ID!) { cartRemovePersonalData(cartId: $cartId) { cart { id } ",
    user_errors!(),
    " } }"
);

pub const CART_PREPARE_FOR_COMPLETION: &str = concat!(
    "mutation CartPrepareForCompletion($cartId: ID!) { cartPrepareForCompletion(cartId: $cartId) { ",
    "result { __typename ",
    "... on CartStatusReady { cart { ...CartParts } } ",
    "... on CartStatusNotReady { errors { code message } } ",
    "... on CartThrottled { pollAfter } } ",
    user_errors!(),
    " } }",
    cart_fragment!()
);

pub const CART_SUBMIT_FOR_COMPLETION: &str = concat!(
    "mutation CartSubmitForCompletion($cartId: ID!, $attemptToken: String!) { ",
    "cartSubmitForCompletion(cartId: $cartId, attemptToken: $attemptToken) { ",
    "result { __typename ",
    "... on SubmitSuccess { redirectUrl attemptId } ",
    "... on SubmitFailed { checkoutUrl errors { code message } } ",
    "... on SubmitAlreadyAccepted { attemptId } ",
    "... on SubmitThrottled { pollAfter } } ",
    user_errors!(),
    " } }"
);

/// Cart address as sent in mutation inputs. Unset fields are omitted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address1: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address2: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    province: Option<&'a str>,
    country: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    zip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
}

impl<'a> From<&'a CartAddress> for AddressInput<'a> {
    fn from(address: &'a CartAddress) -> Self {
        Self {
            first_name: address.first_name.as_deref(),
            last_name: address.last_name.as_deref(),
            address1: address.address1.as_deref(),
            address2: address.address2.as_deref(),
            city: address.city.as_deref(),
            province: address.province.as_deref(),
            country: &address.country,
            zip: address.zip.as_deref(),
            phone: address.phone.as_deref(),
        }
    }
}

pub fn payment_input(total_amount: &Money, payment: &PaymentContent) -> Value {
    json!({
        "amount": total_amount,
        "walletPaymentMethod": {
            "walletContent": {
                "billingAddress": AddressInput::from(&payment.billing_address),
                "data": payment.token.payment_data,
                "transactionIdentifier": payment.token.transaction_identifier,
                "paymentNetwork": payment.token.payment_network,
                "lastDigits": payment.token.last_digits,
            }
        }
    })
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse {
    pub data: Option<Value>,
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineCost {
    total_amount: Money,
}

#[derive(Debug, Deserialize)]
struct ProductNode {
    title: String,
}

#[derive(Debug, Deserialize)]
struct MerchandiseNode {
    id: String,
    title: String,
    product: Option<ProductNode>,
}

#[derive(Debug, Deserialize)]
struct LineNode {
    id: String,
    quantity: u32,
    cost: LineCost,
    merchandise: MerchandiseNode,
}

#[derive(Debug, Default, Deserialize)]
struct DeliveryNode {
    #[serde(default)]
    addresses: Vec<CartDeliveryAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartNode {
    id: String,
    checkout_url: Url,
    buyer_identity: Option<BuyerIdentity>,
    cost: CartCost,
    #[serde(default)]
    lines: Connection<LineNode>,
    #[serde(default)]
    delivery_groups: Connection<DeliveryGroup>,
    #[serde(default)]
    delivery: Option<DeliveryNode>,
}

impl From<CartNode> for Cart {
    fn from(node: CartNode) -> Self {
        let lines = node
            .lines
            .nodes
            .into_iter()
            .map(|line| {
                // Single-variant products report "Default Title" as the variant title.
                let (title, variant_title) = match line.merchandise.product {
                    Some(product) => (product.title, Some(line.merchandise.title)),
                    None => (line.merchandise.title, None),
                };
                CartLine {
                    id: line.id,
                    quantity: line.quantity,
                    merchandise_id: line.merchandise.id,
                    title,
                    variant_title: variant_title.filter(|t| t != "Default Title"),
                    cost: line.cost.total_amount,
                }
            })
            .collect();

        Cart {
            id: node.id,
            checkout_url: node.checkout_url,
            lines,
            cost: node.cost,
            buyer_identity: node.buyer_identity.unwrap_or_default(),
            delivery_groups: node.delivery_groups.nodes,
            delivery_addresses: node.delivery.unwrap_or_default().addresses,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMutationPayload {
    cart: Option<CartNode>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

impl CartMutationPayload {
    pub fn into_cart(self, operation: &str) -> Result<Cart> {
        let cart = self.cart.map(Cart::from);
        if !self.user_errors.is_empty() {
            return Err(CheckoutError::ValidationError {
                errors: self.user_errors,
                cart: cart.map(Box::new),
            });
        }
        cart.ok_or_else(|| {
            CheckoutError::protocol(format!(
                "{operation} returned neither a cart nor user errors"
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserErrorsPayload {
    #[serde(default)]
    user_errors: Vec<UserError>,
}

impl UserErrorsPayload {
    pub fn into_result(self) -> Result<()> {
        if self.user_errors.is_empty() {
            Ok(())
        } else {
            Err(CheckoutError::ValidationError {
                errors: self.user_errors,
                cart: None,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionErrorNode {
    code: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum PrepareResultNode {
    CartStatusReady {
        cart: CartNode,
    },
    CartStatusNotReady {
        #[serde(default)]
        errors: Vec<CompletionErrorNode>,
    },
    CartThrottled {
        #[serde(rename = "pollAfter")]
        poll_after: DateTime<Utc>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparePayload {
    result: Option<PrepareResultNode>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

impl PreparePayload {
    pub fn into_outcome(self) -> Result<PrepareOutcome> {
        if !self.user_errors.is_empty() {
            return Err(CheckoutError::ValidationError {
                errors: self.user_errors,
                cart: None,
            });
        }
        match self.result {
            Some(PrepareResultNode::CartStatusReady { cart }) => {
                let cart = Cart::from(cart);
                let checkout_url = cart.checkout_url.clone();
                Ok(PrepareOutcome::Ready {
                    cart: Box::new(cart),
                    checkout_url,
                })
            }
            Some(PrepareResultNode::CartStatusNotReady { errors }) => Ok(PrepareOutcome::NotReady {
                codes: errors.into_iter().map(|e| e.code).collect(),
            }),
            Some(PrepareResultNode::CartThrottled { poll_after }) => {
                Ok(PrepareOutcome::Throttled { poll_after })
            }
            None => Err(CheckoutError::protocol(
                "cartPrepareForCompletion returned no result",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum SubmitResultNode {
    SubmitSuccess {
        #[serde(rename = "redirectUrl")]
        redirect_url: Url,
        #[serde(rename = "attemptId")]
        attempt_id: String,
    },
    SubmitFailed {
        #[serde(rename = "checkoutUrl", default)]
        checkout_url: Option<Url>,
        #[serde(default)]
        errors: Vec<CompletionErrorNode>,
    },
    SubmitAlreadyAccepted {
        #[serde(rename = "attemptId")]
        attempt_id: String,
    },
    SubmitThrottled {
        #[serde(rename = "pollAfter")]
        poll_after: DateTime<Utc>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPayload {
    result: Option<SubmitResultNode>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

impl SubmitPayload {
    pub fn into_outcome(self) -> Result<SubmitOutcome> {
        if !self.user_errors.is_empty() {
            return Err(CheckoutError::ValidationError {
                errors: self.user_errors,
                cart: None,
            });
        }
        match self.result {
            Some(SubmitResultNode::SubmitSuccess {
                redirect_url,
                attempt_id,
            }) => Ok(SubmitOutcome::Success {
                redirect_url,
                attempt_id,
            }),
            Some(SubmitResultNode::SubmitFailed {
                checkout_url,
                errors,
            }) => Ok(SubmitOutcome::Failed {
                codes: errors.into_iter().map(|e| e.code).collect(),
                checkout_url,
            }),
            Some(SubmitResultNode::SubmitAlreadyAccepted { attempt_id }) => {
                Ok(SubmitOutcome::AlreadyAccepted { attempt_id })
            }
            Some(SubmitResultNode::SubmitThrottled { poll_after }) => {
                Ok(SubmitOutcome::Throttled { poll_after })
            }
            None => Err(CheckoutError::protocol(
                "cartSubmitForCompletion returned no result",
            )),
        }
    }
}
