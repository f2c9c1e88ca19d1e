use crate::core::cart_queries::{
    self, AddressInput, CartMutationPayload, GraphQlResponse, PreparePayload, SubmitPayload,
    UserErrorsPayload,
};
use crate::domain::cart_ops::{
    BuyerIdentityUpdate, DeliveryAddressInput, PrepareOutcome, SubmitOutcome,
};
use crate::domain::model::{
    BuyerIdentity, Cart, CartAddress, CartLineInput, Money, PaymentContent,
};
use crate::domain::ports::{CartApi, ConfigProvider};
use crate::utils::error::{CheckoutError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

pub const ACCESS_TOKEN_HEADER: &str = "X-Storefront-Access-Token";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// GraphQL client for the remote cart.
///
/// Holds no cart state: every operation receives what it needs by value and
/// returns the cart as the server reports it. Nothing is retried here.
#[derive(Debug, Clone)]
pub struct StorefrontCartClient {
    client: Client,
    endpoint: String,
    access_token: String,
    timeout: Duration,
}

impl StorefrontCartClient {
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            access_token: access_token.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Self {
        Self::new(config.storefront_endpoint(), config.access_token())
            .with_timeout(config.request_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submits with a caller-chosen attempt token. The server deduplicates
    /// submissions carrying the same token.
    pub async fn cart_submit_for_completion_with_token(
        &self,
        cart_id: &str,
        attempt_token: Uuid,
    ) -> Result<SubmitOutcome> {
        let payload: SubmitPayload = self
            .execute(
                "CartSubmitForCompletion",
                "cartSubmitForCompletion",
                cart_queries::CART_SUBMIT_FOR_COMPLETION,
                json!({ "cartId": cart_id, "attemptToken": attempt_token.to_string() }),
            )
            .await?;
        payload.into_outcome()
    }

    /// Posts one GraphQL operation and returns the decoded root field.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation_name: &str,
        root_field: &str,
        query: &str,
        variables: Value,
    ) -> Result<T> {
        let data = self.post(operation_name, query, variables).await?;
        let payload = take_field(data, operation_name, root_field)?;
        if payload.is_null() {
            return Err(CheckoutError::protocol(format!(
                "{operation_name} returned null for {root_field}"
            )));
        }
        decode(operation_name, payload)
    }

    async fn mutate_cart(
        &self,
        operation_name: &str,
        root_field: &str,
        query: &str,
        variables: Value,
    ) -> Result<Cart> {
        let payload: CartMutationPayload = self
            .execute(operation_name, root_field, query, variables)
            .await?;
        let cart = payload.into_cart(root_field)?;
        tracing::debug!(
            "{} succeeded for cart {} (total {} {})",
            operation_name,
            cart.id,
            cart.cost.total_amount.amount,
            cart.cost.total_amount.currency_code
        );
        Ok(cart)
    }

    async fn post(&self, operation_name: &str, query: &str, variables: Value) -> Result<Value> {
        let body = json!({
            "operationName": operation_name,
            "query": query,
            "variables": variables,
        });

        tracing::debug!("Sending {} to {}", operation_name, self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("{} response status: {}", operation_name, status);

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CheckoutError::network(format!(
                "{operation_name} failed with HTTP {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let bytes = response.bytes().await?;
        let envelope: GraphQlResponse = serde_json::from_slice(&bytes).map_err(|e| {
            CheckoutError::protocol(format!("{operation_name} response is not valid JSON: {e}"))
        })?;

        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            let messages = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CheckoutError::protocol(format!(
                "{operation_name} returned GraphQL errors: {messages}"
            )));
        }

        envelope
            .data
            .ok_or_else(|| CheckoutError::protocol(format!("{operation_name} returned no data")))
    }
}

fn take_field(mut data: Value, operation_name: &str, root_field: &str) -> Result<Value> {
    data.get_mut(root_field).map(Value::take).ok_or_else(|| {
        CheckoutError::protocol(format!("{operation_name} response is missing {root_field}"))
    })
}

fn decode<T: DeserializeOwned>(operation_name: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        CheckoutError::protocol(format!("{operation_name} response has unexpected shape: {e}"))
    })
}

#[async_trait]
impl CartApi for StorefrontCartClient {
    async fn cart_fetch(&self, cart_id: &str) -> Result<Option<Cart>> {
        let data = self
            .post(
                "CartFetch",
                cart_queries::CART_QUERY,
                json!({ "cartId": cart_id }),
            )
            .await?;
        let node = take_field(data, "CartFetch", "cart")?;
        if node.is_null() {
            tracing::debug!("Cart {} not found", cart_id);
            return Ok(None);
        }
        let node: cart_queries::CartNode = decode("CartFetch", node)?;
        Ok(Some(Cart::from(node)))
    }

    async fn cart_create(
        &self,
        lines: &[CartLineInput],
        buyer_identity: Option<&BuyerIdentity>,
    ) -> Result<Cart> {
        let mut input = json!({ "lines": lines });
        if let Some(identity) = buyer_identity {
            let update = BuyerIdentityUpdate::new()
                .email(identity.email.clone().unwrap_or_default())
                .phone(identity.phone.clone().unwrap_or_default())
                .customer_access_token(identity.customer_access_token.clone().unwrap_or_default())
                .country_code(identity.country_code.clone().unwrap_or_default());
            if !update.is_empty() {
                input["buyerIdentity"] = serde_json::to_value(&update)?;
            }
        }

        self.mutate_cart(
            "CartCreate",
            "cartCreate",
            cart_queries::CART_CREATE,
            json!({ "input": input }),
        )
        .await
    }

    async fn cart_buyer_identity_update(
        &self,
        cart_id: &str,
        fields: &BuyerIdentityUpdate,
    ) -> Result<Cart> {
        if fields.is_empty() {
            return Err(CheckoutError::invalid_input(
                "buyer identity update needs at least one non-empty field",
            ));
        }

        self.mutate_cart(
            "CartBuyerIdentityUpdate",
            "cartBuyerIdentityUpdate",
            cart_queries::CART_BUYER_IDENTITY_UPDATE,
            json!({ "cartId": cart_id, "buyerIdentity": fields }),
        )
        .await
    }

    async fn cart_delivery_addresses_add(
        &self,
        cart_id: &str,
        input: &DeliveryAddressInput,
    ) -> Result<Cart> {
        let validation_strategy = if input.strict_validation {
            "STRICT"
        } else {
            "COUNTRY_CODE_ONLY"
        };
        let addresses = json!([{
            "address": { "deliveryAddress": AddressInput::from(&input.address) },
            "selected": input.selected,
            "validationStrategy": validation_strategy,
        }]);

        self.mutate_cart(
            "CartDeliveryAddressesAdd",
            "cartDeliveryAddressesAdd",
            cart_queries::CART_DELIVERY_ADDRESSES_ADD,
            json!({ "cartId": cart_id, "addresses": addresses }),
        )
        .await
    }

    async fn cart_delivery_addresses_remove(
        &self,
        cart_id: &str,
        address_id: &str,
    ) -> Result<Cart> {
        self.mutate_cart(
            "CartDeliveryAddressesRemove",
            "cartDeliveryAddressesRemove",
            cart_queries::CART_DELIVERY_ADDRESSES_REMOVE,
            json!({ "cartId": cart_id, "addressIds": [address_id] }),
        )
        .await
    }

    async fn cart_selected_delivery_options_update(
        &self,
        cart_id: &str,
        delivery_group_id: &str,
        option_handle: &str,
    ) -> Result<Cart> {
        self.mutate_cart(
            "CartSelectedDeliveryOptionsUpdate",
            "cartSelectedDeliveryOptionsUpdate",
            cart_queries::CART_SELECTED_DELIVERY_OPTIONS_UPDATE,
            json!({
                "cartId": cart_id,
                "selectedDeliveryOptions": [{
                    "deliveryGroupId": delivery_group_id,
                    "deliveryOptionHandle": option_handle,
                }],
            }),
        )
        .await
    }

    async fn cart_payment_update(
        &self,
        cart_id: &str,
        total_amount: &Money,
        payment: &PaymentContent,
    ) -> Result<Cart> {
        self.mutate_cart(
            "CartPaymentUpdate",
            "cartPaymentUpdate",
            cart_queries::CART_PAYMENT_UPDATE,
            json!({
                "cartId": cart_id,
                "payment": cart_queries::payment_input(total_amount, payment),
            }),
        )
        .await
    }

    async fn cart_billing_address_update(
        &self,
        cart_id: &str,
        address: &CartAddress,
    ) -> Result<Cart> {
        self.mutate_cart(
            "CartBillingAddressUpdate",
            "cartBillingAddressUpdate",
            cart_queries::CART_BILLING_ADDRESS_UPDATE,
            json!({ "cartId": cart_id, "billingAddress": AddressInput::from(address) }),
        )
        .await
    }

    async fn cart_remove_personal_data(&self, cart_id: &str) -> Result<()> {
        let payload: UserErrorsPayload = self
            .execute(
                "CartRemovePersonalData",
                "cartRemovePersonalData",
                cart_queries::CART_REMOVE_PERSONAL_DATA,
                json!({ "cartId": cart_id }),
            )
            .await?;
        payload.into_result()
    }

    async fn cart_prepare_for_completion(&self, cart_id: &str) -> Result<PrepareOutcome> {
        let payload: PreparePayload = self
            .execute(
                "CartPrepareForCompletion",
                "cartPrepareForCompletion",
                cart_queries::CART_PREPARE_FOR_COMPLETION,
                json!({ "cartId": cart_id }),
            )
            .await?;
        payload.into_outcome()
    }

    async fn cart_submit_for_completion(&self, cart_id: &str) -> Result<SubmitOutcome> {
        self.cart_submit_for_completion_with_token(cart_id, Uuid::new_v4())
            .await
    }
}
