use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    pub amount: Decimal,
    pub currency_code: String,
}

impl Money {
    pub fn new(amount: Decimal, currency_code: impl Into<String>) -> Self {
        Self {
            amount,
            currency_code: currency_code.into(),
        }
    }

    pub fn zero(currency_code: impl Into<String>) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: String,
    pub quantity: u32,
    pub merchandise_id: String,
    pub title: String,
    pub variant_title: Option<String>,
    /// Total cost of the line (unit price times quantity).
    pub cost: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInput {
    pub merchandise_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCost {
    pub subtotal_amount: Money,
    pub total_amount: Money,
    pub total_tax_amount: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerIdentity {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub customer_access_token: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethodType {
    Shipping,
    PickUp,
    PickupPoint,
    Local,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOption {
    /// Opaque selector, unique within its delivery group.
    pub handle: String,
    pub title: String,
    pub code: Option<String>,
    pub delivery_method_type: DeliveryMethodType,
    pub description: Option<String>,
    pub estimated_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryGroup {
    pub id: String,
    pub delivery_options: Vec<DeliveryOption>,
    pub selected_delivery_option: Option<DeliveryOption>,
}

impl DeliveryGroup {
    pub fn option(&self, handle: &str) -> Option<&DeliveryOption> {
        self.delivery_options.iter().find(|o| o.handle == handle)
    }
}

/// Address in the cart's own vocabulary.
///
/// `country` is never empty: it holds a resolved 2-letter code or
/// [`UNKNOWN_COUNTRY_CODE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartAddress {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: String,
    pub zip: Option<String>,
    pub phone: Option<String>,
}

pub const UNKNOWN_COUNTRY_CODE: &str = "ZZ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartDeliveryAddress {
    pub id: String,
    pub selected: bool,
    pub address: CartAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: String,
    pub checkout_url: Url,
    pub lines: Vec<CartLine>,
    pub cost: CartCost,
    pub buyer_identity: BuyerIdentity,
    pub delivery_groups: Vec<DeliveryGroup>,
    pub delivery_addresses: Vec<CartDeliveryAddress>,
}

impl Cart {
    pub fn selected_address(&self) -> Option<&CartDeliveryAddress> {
        self.delivery_addresses.iter().find(|a| a.selected)
    }

    pub fn requires_shipping(&self) -> bool {
        !self.delivery_groups.is_empty()
    }

    pub fn currency_code(&self) -> &str {
        &self.cost.total_amount.currency_code
    }
}

/// A single entry of a mutation's `userErrors` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Vec<String>,
    pub code: Option<String>,
    pub message: String,
}

/// Postal address as reported by the wallet sheet. Empty strings mean
/// "not provided".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostalAddress {
    /// Street lines separated by `\n`.
    pub street: String,
    pub sub_locality: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub iso_country_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WalletContact {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub postal_address: Option<PostalAddress>,
}

/// Payment token produced by the wallet. Never inspected, only forwarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentToken {
    pub payment_data: serde_json::Value,
    pub transaction_identifier: String,
    pub payment_network: Option<String>,
    pub last_digits: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    pub token: PaymentToken,
    pub billing_contact: Option<WalletContact>,
    pub shipping_contact: Option<WalletContact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentContent {
    pub billing_address: CartAddress,
    pub token: PaymentToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySelection {
    pub delivery_group_id: String,
    pub delivery_option_handle: String,
}

/// Shipping choice as shown on the wallet sheet. One method may select an
/// option in several delivery groups at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethod {
    pub identifier: String,
    pub label: String,
    pub detail: String,
    pub amount: Money,
    #[serde(default)]
    pub selections: Vec<DeliverySelection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryLine {
    pub label: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WalletContactField {
    EmailAddress,
    PhoneNumber,
    Name,
    PostalAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WalletAddressField {
    Street,
    SubLocality,
    City,
    State,
    PostalCode,
    Country,
}

/// Field errors in the wallet sheet's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WalletFieldError {
    ContactInvalid {
        field: WalletContactField,
        message: String,
    },
    ShippingAddressInvalid {
        field: WalletAddressField,
        message: String,
    },
    BillingAddressInvalid {
        field: WalletAddressField,
        message: String,
    },
    AddressUnserviceable {
        message: String,
    },
}

/// What the wallet sheet redraws after a contact or shipping change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetUpdate {
    pub summary: Vec<SummaryLine>,
    pub shipping_methods: Vec<ShippingMethod>,
    pub errors: Vec<WalletFieldError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationStatus {
    Success,
    Failure,
    /// The attempt was not processed at all, e.g. it arrived after the
    /// session ended.
    UndefinedFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResult {
    pub status: AuthorizationStatus,
    pub errors: Vec<WalletFieldError>,
    pub summary: Vec<SummaryLine>,
}

impl AuthorizationResult {
    pub fn success(summary: Vec<SummaryLine>) -> Self {
        Self {
            status: AuthorizationStatus::Success,
            errors: Vec::new(),
            summary,
        }
    }

    pub fn failure(errors: Vec<WalletFieldError>, summary: Vec<SummaryLine>) -> Self {
        Self {
            status: AuthorizationStatus::Failure,
            errors,
            summary,
        }
    }

    pub fn undefined_failure(summary: Vec<SummaryLine>) -> Self {
        Self {
            status: AuthorizationStatus::UndefinedFailure,
            errors: Vec::new(),
            summary,
        }
    }
}

/// Everything the wallet sheet needs to open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub merchant_identifier: String,
    pub country_code: String,
    pub currency_code: String,
    pub supported_networks: Vec<String>,
    pub required_contact_fields: Vec<WalletContactField>,
    pub summary: Vec<SummaryLine>,
    pub shipping_methods: Vec<ShippingMethod>,
}

/// Where a wallet payment gets its cart from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CartSource {
    Existing {
        cart_id: String,
    },
    Lines {
        lines: Vec<CartLineInput>,
        buyer_identity: Option<BuyerIdentity>,
    },
}
