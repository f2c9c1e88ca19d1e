use crate::domain::cart_ops::{
    BuyerIdentityUpdate, DeliveryAddressInput, PrepareOutcome, SubmitOutcome,
};
use crate::domain::model::{
    BuyerIdentity, Cart, CartAddress, CartLineInput, Money, PaymentContent, PaymentRequest,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Typed access to the remote cart. Each call is attempted exactly once.
#[async_trait]
pub trait CartApi: Send + Sync {
    async fn cart_fetch(&self, cart_id: &str) -> Result<Option<Cart>>;

    async fn cart_create(
        &self,
        lines: &[CartLineInput],
        buyer_identity: Option<&BuyerIdentity>,
    ) -> Result<Cart>;

    async fn cart_buyer_identity_update(
        &self,
        cart_id: &str,
        fields: &BuyerIdentityUpdate,
    ) -> Result<Cart>;

    async fn cart_delivery_addresses_add(
        &self,
        cart_id: &str,
        input: &DeliveryAddressInput,
    ) -> Result<Cart>;

    async fn cart_delivery_addresses_remove(&self, cart_id: &str, address_id: &str)
        -> Result<Cart>;

    async fn cart_selected_delivery_options_update(
        &self,
        cart_id: &str,
        delivery_group_id: &str,
        option_handle: &str,
    ) -> Result<Cart>;

    async fn cart_payment_update(
        &self,
        cart_id: &str,
        total_amount: &Money,
        payment: &PaymentContent,
    ) -> Result<Cart>;

    async fn cart_billing_address_update(
        &self,
        cart_id: &str,
        address: &CartAddress,
    ) -> Result<Cart>;

    async fn cart_remove_personal_data(&self, cart_id: &str) -> Result<()>;

    async fn cart_prepare_for_completion(&self, cart_id: &str) -> Result<PrepareOutcome>;

    /// Submits the cart with a freshly generated attempt token.
    async fn cart_submit_for_completion(&self, cart_id: &str) -> Result<SubmitOutcome>;
}

/// The host platform's wallet payment sheet.
#[async_trait]
pub trait WalletSheet: Send + Sync {
    /// Asks the host to show the sheet. `Ok(false)` means the host declined.
    async fn present(&self, request: PaymentRequest) -> Result<bool>;

    async fn dismiss(&self);
}

/// Hands the buyer over to the hosted checkout page.
#[async_trait]
pub trait CheckoutPresenter: Send + Sync {
    async fn present(&self, url: Url);
}

pub trait ConfigProvider: Send + Sync {
    fn storefront_endpoint(&self) -> &str;
    fn access_token(&self) -> &str;
    fn request_timeout(&self) -> Duration;
    fn merchant_display_name(&self) -> &str;
}
