#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wallet_checkout::core::{CartApi, CheckoutPresenter, WalletSheet};
use wallet_checkout::domain::cart_ops::{
    BuyerIdentityUpdate, DeliveryAddressInput, PrepareOutcome, SubmitOutcome,
};
use wallet_checkout::domain::model::{
    BuyerIdentity, Cart, CartAddress, CartCost, CartDeliveryAddress, CartLine, CartLineInput,
    DeliveryGroup, DeliveryMethodType, DeliveryOption, Money, PaymentAuthorization,
    PaymentContent, PaymentRequest, PaymentToken, PostalAddress, UserError, WalletContact,
};
use wallet_checkout::utils::error::{CheckoutError, Result};
use wallet_checkout::{WalletPaymentOrchestrator, WalletSettings};

pub const CHECKOUT_URL: &str = "https://shop.example.com/checkouts/c/1";
pub const REDIRECT_URL: &str = "https://shop.example.com/thank-you/1";

pub fn usd(amount: Decimal) -> Money {
    Money::new(amount, "USD")
}

fn option(handle: &str, title: &str, amount: Decimal) -> DeliveryOption {
    DeliveryOption {
        handle: handle.to_string(),
        title: title.to_string(),
        code: None,
        delivery_method_type: DeliveryMethodType::Shipping,
        description: None,
        estimated_cost: usd(amount),
    }
}

/// One mug line and a single delivery group with two options, nothing
/// selected yet.
pub fn sample_cart() -> Cart {
    Cart {
        id: "gid://shop/Cart/1".to_string(),
        checkout_url: Url::parse(CHECKOUT_URL).unwrap(),
        lines: vec![CartLine {
            id: "gid://shop/CartLine/1".to_string(),
            quantity: 2,
            merchandise_id: "gid://shop/ProductVariant/7".to_string(),
            title: "Mug".to_string(),
            variant_title: None,
            cost: usd(dec!(20.00)),
        }],
        cost: CartCost {
            subtotal_amount: usd(dec!(20.00)),
            total_amount: usd(dec!(30.00)),
            total_tax_amount: None,
        },
        buyer_identity: BuyerIdentity::default(),
        delivery_groups: vec![DeliveryGroup {
            id: "gid://shop/DeliveryGroup/1".to_string(),
            delivery_options: vec![
                option("standard", "Standard", dec!(10.00)),
                option("express", "Express", dec!(20.99)),
            ],
            selected_delivery_option: None,
        }],
        delivery_addresses: Vec::new(),
    }
}

pub fn sample_lines() -> Vec<CartLineInput> {
    vec![CartLineInput {
        merchandise_id: "gid://shop/ProductVariant/7".to_string(),
        quantity: 2,
    }]
}

pub fn sample_contact() -> WalletContact {
    WalletContact {
        given_name: Some("Ada".to_string()),
        family_name: Some("Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        phone: Some("+15555550100".to_string()),
        postal_address: Some(PostalAddress {
            street: "1 Main St\nApt 4".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
            iso_country_code: "us".to_string(),
            ..PostalAddress::default()
        }),
    }
}

pub fn sample_authorization() -> PaymentAuthorization {
    PaymentAuthorization {
        token: PaymentToken {
            payment_data: serde_json::json!({ "version": "EC_v1", "data": "opaque" }),
            transaction_identifier: "txn-1".to_string(),
            payment_network: Some("Visa".to_string()),
            last_digits: Some("4242".to_string()),
        },
        billing_contact: Some(sample_contact()),
        shipping_contact: Some(sample_contact()),
    }
}

pub fn user_error(path: &[&str], code: &str, message: &str) -> UserError {
    UserError {
        field: path.iter().map(|s| s.to_string()).collect(),
        code: Some(code.to_string()),
        message: message.to_string(),
    }
}

/// In-memory cart API that applies mutations to a single cart and records
/// the operations it receives.
pub struct MockCartApi {
    cart: Mutex<Cart>,
    calls: Mutex<Vec<&'static str>>,
    next_address_id: AtomicUsize,
    prepare_outcome: Mutex<Option<PrepareOutcome>>,
    submit_outcome: Mutex<Option<SubmitOutcome>>,
    identity_errors: Mutex<Option<Vec<UserError>>>,
    address_add_delay: Mutex<Option<Duration>>,
    submit_delay: Mutex<Option<Duration>>,
    fetch_returns_none: bool,
}

impl MockCartApi {
    pub fn new() -> Self {
        Self::with_cart(sample_cart())
    }

    pub fn with_cart(cart: Cart) -> Self {
        Self {
            cart: Mutex::new(cart),
            calls: Mutex::new(Vec::new()),
            next_address_id: AtomicUsize::new(1),
            prepare_outcome: Mutex::new(None),
            submit_outcome: Mutex::new(None),
            identity_errors: Mutex::new(None),
            address_add_delay: Mutex::new(None),
            submit_delay: Mutex::new(None),
            fetch_returns_none: false,
        }
    }

    pub fn missing_cart() -> Self {
        Self {
            fetch_returns_none: true,
            ..Self::new()
        }
    }

    pub fn prepare_returns(self, outcome: PrepareOutcome) -> Self {
        *self.prepare_outcome.lock().unwrap() = Some(outcome);
        self
    }

    pub fn submit_returns(self, outcome: SubmitOutcome) -> Self {
        *self.submit_outcome.lock().unwrap() = Some(outcome);
        self
    }

    pub fn identity_update_fails_with(self, errors: Vec<UserError>) -> Self {
        *self.identity_errors.lock().unwrap() = Some(errors);
        self
    }

    pub fn delay_address_add(self, delay: Duration) -> Self {
        *self.address_add_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn delay_submit(self, delay: Duration) -> Self {
        *self.submit_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| **c == operation).count()
    }

    fn record(&self, operation: &'static str) {
        self.calls.lock().unwrap().push(operation);
    }

    fn snapshot(&self) -> Cart {
        self.cart.lock().unwrap().clone()
    }
}

#[async_trait]
impl CartApi for MockCartApi {
    async fn cart_fetch(&self, _cart_id: &str) -> Result<Option<Cart>> {
        self.record("cart_fetch");
        if self.fetch_returns_none {
            return Ok(None);
        }
        Ok(Some(self.snapshot()))
    }

    async fn cart_create(
        &self,
        _lines: &[CartLineInput],
        _buyer_identity: Option<&BuyerIdentity>,
    ) -> Result<Cart> {
        self.record("cart_create");
        Ok(self.snapshot())
    }

    async fn cart_buyer_identity_update(
        &self,
        _cart_id: &str,
        fields: &BuyerIdentityUpdate,
    ) -> Result<Cart> {
        self.record("cart_buyer_identity_update");
        if let Some(errors) = self.identity_errors.lock().unwrap().clone() {
            return Err(CheckoutError::ValidationError { errors, cart: None });
        }
        let mut cart = self.cart.lock().unwrap();
        cart.buyer_identity.email = fields.email_value().map(str::to_string);
        cart.buyer_identity.phone = fields.phone_value().map(str::to_string);
        Ok(cart.clone())
    }

    async fn cart_delivery_addresses_add(
        &self,
        _cart_id: &str,
        input: &DeliveryAddressInput,
    ) -> Result<Cart> {
        self.record("cart_delivery_addresses_add");
        let delay = *self.address_add_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let id = self.next_address_id.fetch_add(1, Ordering::SeqCst);
        let mut cart = self.cart.lock().unwrap();
        for address in cart.delivery_addresses.iter_mut() {
            address.selected = false;
        }
        cart.delivery_addresses.push(CartDeliveryAddress {
            id: format!("gid://shop/CartSelectableAddress/{id}"),
            selected: input.selected,
            address: input.address.clone(),
        });
        Ok(cart.clone())
    }

    async fn cart_delivery_addresses_remove(
        &self,
        _cart_id: &str,
        address_id: &str,
    ) -> Result<Cart> {
        self.record("cart_delivery_addresses_remove");
        let mut cart = self.cart.lock().unwrap();
        cart.delivery_addresses.retain(|a| a.id != address_id);
        Ok(cart.clone())
    }

    async fn cart_selected_delivery_options_update(
        &self,
        _cart_id: &str,
        delivery_group_id: &str,
        option_handle: &str,
    ) -> Result<Cart> {
        self.record("cart_selected_delivery_options_update");
        let mut cart = self.cart.lock().unwrap();
        for group in cart.delivery_groups.iter_mut() {
            if group.id == delivery_group_id {
                group.selected_delivery_option = group.option(option_handle).cloned();
            }
        }
        Ok(cart.clone())
    }

    async fn cart_payment_update(
        &self,
        _cart_id: &str,
        _total_amount: &Money,
        _payment: &PaymentContent,
    ) -> Result<Cart> {
        self.record("cart_payment_update");
        Ok(self.snapshot())
    }

    async fn cart_billing_address_update(
        &self,
        _cart_id: &str,
        _address: &CartAddress,
    ) -> Result<Cart> {
        self.record("cart_billing_address_update");
        Ok(self.snapshot())
    }

    async fn cart_remove_personal_data(&self, _cart_id: &str) -> Result<()> {
        self.record("cart_remove_personal_data");
        Ok(())
    }

    async fn cart_prepare_for_completion(&self, _cart_id: &str) -> Result<PrepareOutcome> {
        self.record("cart_prepare_for_completion");
        if let Some(outcome) = self.prepare_outcome.lock().unwrap().clone() {
            return Ok(outcome);
        }
        let cart = self.snapshot();
        let checkout_url = cart.checkout_url.clone();
        Ok(PrepareOutcome::Ready {
            cart: Box::new(cart),
            checkout_url,
        })
    }

    async fn cart_submit_for_completion(&self, _cart_id: &str) -> Result<SubmitOutcome> {
        self.record("cart_submit_for_completion");
        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(outcome) = self.submit_outcome.lock().unwrap().clone() {
            return Ok(outcome);
        }
        Ok(SubmitOutcome::Success {
            redirect_url: Url::parse(REDIRECT_URL).unwrap(),
            attempt_id: "attempt-1".to_string(),
        })
    }
}

pub fn throttled_until() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

#[derive(Default)]
pub struct RecordingSheet {
    pub requests: Mutex<Vec<PaymentRequest>>,
    pub dismissals: AtomicUsize,
    pub decline: bool,
}

impl RecordingSheet {
    pub fn declining() -> Self {
        Self {
            decline: true,
            ..Self::default()
        }
    }

    pub fn dismissals(&self) -> usize {
        self.dismissals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSheet for RecordingSheet {
    async fn present(&self, request: PaymentRequest) -> Result<bool> {
        self.requests.lock().unwrap().push(request);
        Ok(!self.decline)
    }

    async fn dismiss(&self) {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    urls: Mutex<Vec<Url>>,
}

impl RecordingPresenter {
    pub fn urls(&self) -> Vec<Url> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckoutPresenter for RecordingPresenter {
    async fn present(&self, url: Url) {
        self.urls.lock().unwrap().push(url);
    }
}

pub struct Harness {
    pub api: Arc<MockCartApi>,
    pub sheet: Arc<RecordingSheet>,
    pub presenter: Arc<RecordingPresenter>,
}

impl Harness {
    pub fn new(api: MockCartApi) -> Self {
        Self::with_sheet(api, RecordingSheet::default())
    }

    pub fn with_sheet(api: MockCartApi, sheet: RecordingSheet) -> Self {
        Self {
            api: Arc::new(api),
            sheet: Arc::new(sheet),
            presenter: Arc::new(RecordingPresenter::default()),
        }
    }

    pub fn orchestrator(&self) -> WalletPaymentOrchestrator {
        WalletPaymentOrchestrator::new(
            self.api.clone(),
            self.sheet.clone(),
            self.presenter.clone(),
            WalletSettings::default(),
        )
    }
}
