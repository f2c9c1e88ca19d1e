//! Coordinates one wallet payment session.
//!
//! The orchestrator is the only place that decides what the buyer sees: it
//! owns the payment state, the cart snapshot and the sheet-side selections,
//! and turns cart client results into transitions. Every state change goes
//! through [`WalletPaymentOrchestrator::transition`], which runs the entry
//! effects of each state it lands on.

use crate::core::contact_adapter;
use crate::core::error_mapping::{AddressRole, ValidationErrorMap};
use crate::core::state_machine::{
    InterruptReason, PaymentState, PaymentStateKind, PaymentStateMachine,
};
use crate::domain::cart_ops::{DeliveryAddressInput, PrepareOutcome, SubmitOutcome};
use crate::domain::model::{
    AuthorizationResult, Cart, CartSource, Money, PaymentAuthorization, PaymentContent,
    PaymentRequest, SheetUpdate, ShippingMethod, SummaryLine, WalletContact, WalletContactField,
    WalletFieldError,
};
use crate::domain::ports::{CartApi, CheckoutPresenter, WalletSheet};
use crate::utils::error::{CheckoutError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use url::Url;

const NOT_ENOUGH_STOCK_CODE: &str = "MERCHANDISE_NOT_ENOUGH_STOCK";
const OUT_OF_STOCK_CODE: &str = "MERCHANDISE_OUT_OF_STOCK";

/// Merchant-side settings for the wallet sheet.
#[derive(Debug, Clone)]
pub struct WalletSettings {
    pub merchant_identifier: String,
    /// Label of the total line. Empty keeps the generic label.
    pub merchant_display_name: String,
    pub country_code: String,
    pub supported_networks: Vec<String>,
    pub required_contact_fields: Vec<WalletContactField>,
    pub error_map: ValidationErrorMap,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            merchant_identifier: "merchant.com.example".to_string(),
            merchant_display_name: String::new(),
            country_code: "US".to_string(),
            supported_networks: vec![
                "visa".to_string(),
                "masterCard".to_string(),
                "amex".to_string(),
            ],
            required_contact_fields: vec![
                WalletContactField::Name,
                WalletContactField::EmailAddress,
                WalletContactField::PhoneNumber,
                WalletContactField::PostalAddress,
            ],
            error_map: ValidationErrorMap::default(),
        }
    }
}

/// How an authorization attempt ended when no step failed outright.
enum Settlement {
    Submitted(Url),
    Interrupted(InterruptReason),
    Declined(CheckoutError),
    /// The buyer has to correct the sheet before authorizing again.
    InvalidFields(Vec<WalletFieldError>),
}

/// A failed authorization step and the address its errors refer to.
struct StepFailure {
    error: CheckoutError,
    role: AddressRole,
}

impl StepFailure {
    fn billing(error: CheckoutError) -> Self {
        Self {
            error,
            role: AddressRole::Billing,
        }
    }
}

impl From<CheckoutError> for StepFailure {
    fn from(error: CheckoutError) -> Self {
        Self {
            error,
            role: AddressRole::Shipping,
        }
    }
}

enum Raced {
    Finished(std::result::Result<Result<Cart>, JoinError>),
    Cancelled,
}

pub struct WalletPaymentOrchestrator {
    machine: PaymentStateMachine,
    cart: Option<Cart>,
    selected_address_id: Option<String>,
    selected_shipping_method: Option<ShippingMethod>,
    /// Total last shown on the sheet, used to detect price changes.
    shown_total: Option<Money>,
    personal_data_written: bool,
    cancel_signal: Option<watch::Receiver<u64>>,
    cancels_handled: u64,
    cart_api: Arc<dyn CartApi>,
    sheet: Arc<dyn WalletSheet>,
    presenter: Arc<dyn CheckoutPresenter>,
    settings: WalletSettings,
}

impl WalletPaymentOrchestrator {
    pub fn new(
        cart_api: Arc<dyn CartApi>,
        sheet: Arc<dyn WalletSheet>,
        presenter: Arc<dyn CheckoutPresenter>,
        settings: WalletSettings,
    ) -> Self {
        Self {
            machine: PaymentStateMachine::new(),
            cart: None,
            selected_address_id: None,
            selected_shipping_method: None,
            shown_total: None,
            personal_data_written: false,
            cancel_signal: None,
            cancels_handled: 0,
            cart_api,
            sheet,
            presenter,
            settings,
        }
    }

    pub fn state(&self) -> &PaymentState {
        self.machine.state()
    }

    pub fn cart(&self) -> Option<&Cart> {
        self.cart.as_ref()
    }

    pub fn transition_log(&self) -> &[PaymentStateKind] {
        self.machine.log()
    }

    pub fn selected_shipping_method(&self) -> Option<&ShippingMethod> {
        self.selected_shipping_method.as_ref()
    }

    pub fn settings(&self) -> &WalletSettings {
        &self.settings
    }

    /// Lets a user cancel pre-empt in-flight cart mutations. The signal
    /// carries a generation counter bumped on every cancel.
    pub(crate) fn attach_cancel_signal(&mut self, signal: watch::Receiver<u64>) {
        self.cancels_handled = *signal.borrow();
        self.cancel_signal = Some(signal);
    }

    /// Applies `next` when the transition table allows it, then runs the
    /// entry effects of every state reached. Returns whether `next` itself
    /// was accepted.
    pub async fn transition(&mut self, next: PaymentState) -> bool {
        let Some(mut previous) = self.machine.apply(next) else {
            return false;
        };

        while let Some(follow_up) = self.enter(&previous).await {
            match self.machine.apply(follow_up) {
                Some(state) => previous = state,
                None => break,
            }
        }
        true
    }

    /// Entry effect of the current state, returning the state to move to
    /// next if any.
    async fn enter(&mut self, previous: &PaymentState) -> Option<PaymentState> {
        let current = self.machine.state().clone();
        match current {
            PaymentState::UnexpectedError { .. } | PaymentState::TerminalError { .. } => {
                self.sheet.dismiss().await;
                Some(PaymentState::Completed)
            }
            PaymentState::Completed => {
                let hands_off = previous.carries_error()
                    || matches!(
                        previous.kind(),
                        PaymentStateKind::CartSubmittedForCompletion | PaymentStateKind::Interrupt
                    );
                if hands_off {
                    Some(PaymentState::PresentingFallback {
                        url: self.fallback_url_for(previous),
                    })
                } else {
                    Some(PaymentState::Reset)
                }
            }
            PaymentState::PresentingFallback { url: Some(url) } => {
                tracing::info!("🔗 Handing off to checkout: {}", url);
                self.presenter.present(url).await;
                Some(PaymentState::Completed)
            }
            PaymentState::PresentingFallback { url: None } => {
                tracing::debug!("No checkout URL to hand off to");
                Some(PaymentState::Completed)
            }
            PaymentState::Reset => {
                self.clear_session();
                Some(PaymentState::Idle)
            }
            _ => None,
        }
    }

    /// URL the buyer continues on after leaving `state`.
    pub fn fallback_url_for(&self, state: &PaymentState) -> Option<Url> {
        match state {
            PaymentState::CartSubmittedForCompletion { redirect_url } => Some(redirect_url.clone()),
            PaymentState::Interrupt { reason } => {
                let mut url = self.cart.as_ref()?.checkout_url.clone();
                if let Some(parameter) = reason.query_parameter() {
                    url.query_pairs_mut().append_pair(parameter, "true");
                }
                Some(url)
            }
            _ => self.cart.as_ref().map(|cart| cart.checkout_url.clone()),
        }
    }

    /// Loads the cart and asks the host to show the wallet sheet. Returns
    /// whether the sheet is now open.
    pub async fn start(&mut self, source: CartSource) -> bool {
        if !self.transition(PaymentState::StartPaymentRequest).await {
            return false;
        }

        let cart = match self.load_cart(source).await {
            Ok(cart) => cart,
            Err(error) => {
                self.fail(error).await;
                return false;
            }
        };
        tracing::info!(
            "🛒 Wallet payment for cart {} ({} line(s), total {} {})",
            cart.id,
            cart.lines.len(),
            cart.cost.total_amount.amount,
            cart.cost.total_amount.currency_code
        );

        self.selected_address_id = cart.selected_address().map(|address| address.id.clone());
        self.selected_shipping_method = contact_adapter::selected_shipping_method(&cart);
        self.shown_total = Some(cart.cost.total_amount.clone());
        self.cart = Some(cart);

        let Some(request) = self.payment_request() else {
            self.fail(CheckoutError::invalid_input("no cart to build a payment request from"))
                .await;
            return false;
        };
        match self.sheet.present(request).await {
            Ok(true) => self.transition(PaymentState::SheetPresented).await,
            Ok(false) => {
                tracing::warn!("Wallet sheet could not be presented");
                self.transition(PaymentState::Reset).await;
                false
            }
            Err(error) => {
                self.fail(error).await;
                false
            }
        }
    }

    async fn load_cart(&self, source: CartSource) -> Result<Cart> {
        match source {
            CartSource::Existing { cart_id } => self
                .cart_api
                .cart_fetch(&cart_id)
                .await?
                .ok_or_else(|| CheckoutError::invalid_input(format!("cart {cart_id} not found"))),
            CartSource::Lines {
                lines,
                buyer_identity,
            } => {
                if lines.is_empty() {
                    return Err(CheckoutError::invalid_input(
                        "a wallet payment needs at least one cart line",
                    ));
                }
                self.cart_api
                    .cart_create(&lines, buyer_identity.as_ref())
                    .await
            }
        }
    }

    fn payment_request(&self) -> Option<PaymentRequest> {
        let cart = self.cart.as_ref()?;
        Some(PaymentRequest {
            merchant_identifier: self.settings.merchant_identifier.clone(),
            country_code: self.settings.country_code.clone(),
            currency_code: cart.currency_code().to_string(),
            supported_networks: self.settings.supported_networks.clone(),
            required_contact_fields: self.settings.required_contact_fields.clone(),
            summary: self.summary(),
            shipping_methods: contact_adapter::create_shipping_methods(cart),
        })
    }

    pub async fn on_sheet_presented(&mut self) -> bool {
        if self.state().kind() == PaymentStateKind::SheetPresented {
            tracing::debug!("Wallet sheet already presented");
            return true;
        }
        self.transition(PaymentState::SheetPresented).await
    }

    /// Replaces the delivery address with the one picked on the sheet and
    /// returns the refreshed summary and shipping methods.
    pub async fn on_contact_selected(&mut self, contact: WalletContact) -> SheetUpdate {
        if !self.accepts_sheet_event("contact selection") {
            return self.sheet_update(Vec::new());
        }
        let Some(cart_id) = self.cart.as_ref().map(|cart| cart.id.clone()) else {
            return self.sheet_update(Vec::new());
        };

        let address = match contact_adapter::contact_to_address(&contact) {
            Ok(address) => address,
            Err(error) => {
                tracing::debug!("Contact has no usable address: {}", error);
                return self.sheet_update(vec![WalletFieldError::ContactInvalid {
                    field: WalletContactField::PostalAddress,
                    message: error.user_friendly_message(),
                }]);
            }
        };
        self.personal_data_written = true;

        // The cart has no atomic address update: drop the old one first.
        if let Some(address_id) = self.selected_address_id.clone() {
            let id = cart_id.clone();
            let task = self.spawn_mutation(move |api| async move {
                api.cart_delivery_addresses_remove(&id, &address_id).await
            });
            match self.await_mutation("cartDeliveryAddressesRemove", task).await {
                None => return SheetUpdate::default(),
                Some(Ok(cart)) => {
                    self.selected_address_id = None;
                    self.cart = Some(cart);
                }
                Some(Err(error)) => {
                    return self.reject_sheet_change(error, AddressRole::Shipping).await
                }
            }
        }

        // Partial addresses are normal while the sheet is open.
        let input = DeliveryAddressInput::new(address).strict_validation(false);
        let task = self.spawn_mutation(move |api| async move {
            api.cart_delivery_addresses_add(&cart_id, &input).await
        });
        match self.await_mutation("cartDeliveryAddressesAdd", task).await {
            None => SheetUpdate::default(),
            Some(Ok(cart)) => {
                self.selected_address_id = cart.selected_address().map(|address| address.id.clone());
                self.cart = Some(cart);
                self.refresh_shipping_selection().await
            }
            Some(Err(error)) => self.reject_sheet_change(error, AddressRole::Shipping).await,
        }
    }

    /// Applies the shipping method picked on the sheet. Unknown identifiers
    /// fall back to the first method; with no methods at all the previous
    /// selection stays.
    pub async fn on_shipping_method_selected(&mut self, identifier: &str) -> SheetUpdate {
        if !self.accepts_sheet_event("shipping method selection") {
            return self.sheet_update(Vec::new());
        }

        let methods = self
            .cart
            .as_ref()
            .map(contact_adapter::create_shipping_methods)
            .unwrap_or_default();
        let chosen = match methods.iter().find(|method| method.identifier == identifier) {
            Some(method) => method.clone(),
            None => match methods.first() {
                Some(first) => {
                    tracing::warn!(
                        "Unknown shipping method {}, using {} instead",
                        identifier,
                        first.identifier
                    );
                    first.clone()
                }
                None => {
                    tracing::warn!("No shipping methods available, keeping previous selection");
                    return self.sheet_update(Vec::new());
                }
            },
        };

        self.apply_shipping_method(chosen).await
    }

    /// Pushes the wallet's contacts and token to the cart, then prepares and
    /// submits it.
    pub async fn on_payment_authorized(
        &mut self,
        authorization: PaymentAuthorization,
    ) -> AuthorizationResult {
        let authorized = PaymentState::PaymentAuthorized {
            token: authorization.token.clone(),
        };
        if !self.transition(authorized).await {
            tracing::warn!("Ignoring payment authorization in state {}", self.state());
            return AuthorizationResult::undefined_failure(self.summary());
        }

        match self.settle(&authorization).await {
            Ok(Settlement::Submitted(redirect_url)) => {
                let summary = self.summary();
                self.transition(PaymentState::CartSubmittedForCompletion { redirect_url })
                    .await;
                self.close_sheet().await;
                AuthorizationResult::success(summary)
            }
            Ok(Settlement::Interrupted(reason)) => {
                tracing::info!("⚠️ Wallet payment interrupted: {:?}", reason);
                let summary = self.summary();
                self.transition(PaymentState::Interrupt { reason }).await;
                self.close_sheet().await;
                AuthorizationResult::failure(Vec::new(), summary)
            }
            Ok(Settlement::Declined(error)) => self.decline(error).await,
            Ok(Settlement::InvalidFields(errors)) => self.reopen_sheet(errors).await,
            Err(StepFailure { error, role }) => {
                if let Some(errors) = self.settings.error_map.translate(error.user_errors(), role) {
                    self.adopt_partial_cart(&error);
                    return self.reopen_sheet(errors).await;
                }
                if matches!(error, CheckoutError::ValidationError { .. }) {
                    return self.decline(error).await;
                }
                let summary = self.summary();
                self.fail(error).await;
                AuthorizationResult::failure(Vec::new(), summary)
            }
        }
    }

    /// Ends the session at the buyer's request. Rejected while an
    /// authorization is being processed.
    pub async fn on_user_cancelled(&mut self) -> bool {
        let scrub = self.scrub_target();
        if !self.transition(PaymentState::Completed).await {
            return false;
        }
        tracing::info!("🛑 Wallet payment cancelled by the buyer");
        self.scrub_personal_data(scrub).await;
        true
    }

    /// Applies a cancel raised through the signal since the last one
    /// handled. A cancel rejected mid-authorization stays pending.
    pub(crate) async fn apply_pending_cancel(&mut self) -> bool {
        let Some(generation) = self.pending_cancel() else {
            return false;
        };
        if self.on_user_cancelled().await {
            self.cancels_handled = generation;
            return true;
        }
        if self.state().kind() != PaymentStateKind::PaymentAuthorized {
            tracing::debug!("Dropping cancel in state {}", self.state());
            self.cancels_handled = generation;
        }
        false
    }

    fn pending_cancel(&self) -> Option<u64> {
        let generation = *self.cancel_signal.as_ref()?.borrow();
        (generation > self.cancels_handled).then_some(generation)
    }

    async fn settle(
        &mut self,
        authorization: &PaymentAuthorization,
    ) -> std::result::Result<Settlement, StepFailure> {
        let cart_id = self
            .cart
            .as_ref()
            .map(|cart| cart.id.clone())
            .ok_or_else(|| CheckoutError::invalid_input("no cart in the wallet session"))?;
        let shipping_contact = authorization.shipping_contact.as_ref();
        let billing_contact = authorization.billing_contact.as_ref();

        // Carts without delivery groups never need the shipping address.
        let requires_shipping = self.cart.as_ref().is_some_and(Cart::requires_shipping);
        let shipping_address = if requires_shipping {
            let converted = shipping_contact
                .ok_or_else(|| CheckoutError::MissingFieldError {
                    field: "shipping_contact".to_string(),
                })
                .and_then(contact_adapter::contact_to_address);
            match converted {
                Ok(address) => Some(address),
                Err(error) => {
                    tracing::debug!("Authorized shipping contact is unusable: {}", error);
                    return Ok(Settlement::InvalidFields(vec![
                        WalletFieldError::ContactInvalid {
                            field: WalletContactField::PostalAddress,
                            message: error.user_friendly_message(),
                        },
                    ]));
                }
            }
        } else {
            None
        };

        let identity = [shipping_contact, billing_contact]
            .into_iter()
            .flatten()
            .map(contact_adapter::buyer_identity_from_contact)
            .find(|update| !update.is_empty());
        match identity {
            Some(identity) => {
                self.personal_data_written = true;
                let cart = self
                    .cart_api
                    .cart_buyer_identity_update(&cart_id, &identity)
                    .await?;
                self.cart = Some(cart);
            }
            None => tracing::debug!("No buyer identity on the authorized contacts"),
        }

        if let Some(address) = shipping_address.clone() {
            self.personal_data_written = true;
            if let Some(address_id) = self.selected_address_id.clone() {
                let cart = self
                    .cart_api
                    .cart_delivery_addresses_remove(&cart_id, &address_id)
                    .await?;
                self.selected_address_id = None;
                self.cart = Some(cart);
            }
            let cart = self
                .cart_api
                .cart_delivery_addresses_add(&cart_id, &DeliveryAddressInput::new(address))
                .await?;
            self.selected_address_id = cart.selected_address().map(|address| address.id.clone());
            self.cart = Some(cart);
            self.reselect_delivery_options(&cart_id).await?;
        }

        let billing_address = match billing_contact {
            Some(contact) => {
                contact_adapter::contact_to_address(contact).map_err(StepFailure::billing)?
            }
            None => match (shipping_address, shipping_contact) {
                (Some(address), _) => address,
                (None, Some(contact)) => {
                    contact_adapter::contact_to_address(contact).map_err(StepFailure::billing)?
                }
                (None, None) => {
                    return Err(StepFailure::billing(CheckoutError::MissingFieldError {
                        field: "billing_contact".to_string(),
                    }))
                }
            },
        };
        let cart = self
            .cart_api
            .cart_billing_address_update(&cart_id, &billing_address)
            .await
            .map_err(StepFailure::billing)?;

        let total = cart.cost.total_amount.clone();
        self.cart = Some(cart);
        let payment = PaymentContent {
            billing_address,
            token: authorization.token.clone(),
        };
        let cart = self
            .cart_api
            .cart_payment_update(&cart_id, &total, &payment)
            .await
            .map_err(StepFailure::billing)?;
        self.cart = Some(cart);

        let (mut prepared, checkout_url) = match self
            .cart_api
            .cart_prepare_for_completion(&cart_id)
            .await?
        {
            PrepareOutcome::Ready { cart, checkout_url } => (*cart, checkout_url),
            PrepareOutcome::NotReady { codes } => {
                tracing::info!("Cart not ready for completion: {:?}", codes);
                return Ok(Settlement::Interrupted(InterruptReason::CartNotReady));
            }
            PrepareOutcome::Throttled { poll_after } => {
                tracing::info!("Cart preparation throttled until {}", poll_after);
                return Ok(Settlement::Interrupted(InterruptReason::CartThrottled));
            }
        };
        prepared.checkout_url = checkout_url;
        let price_change = self.price_change(&prepared);
        self.cart = Some(prepared);
        if let Some(reason) = price_change {
            return Ok(Settlement::Interrupted(reason));
        }

        let outcome = self.cart_api.cart_submit_for_completion(&cart_id).await?;
        match &outcome {
            SubmitOutcome::Success {
                redirect_url,
                attempt_id,
            } => {
                tracing::info!("✅ Cart {} submitted (attempt {})", cart_id, attempt_id);
                return Ok(Settlement::Submitted(redirect_url.clone()));
            }
            SubmitOutcome::AlreadyAccepted { attempt_id } => {
                tracing::warn!("Submission already accepted as attempt {}", attempt_id);
                return Ok(Settlement::Interrupted(InterruptReason::Other));
            }
            SubmitOutcome::Throttled { poll_after } => {
                tracing::info!("Cart submission throttled until {}", poll_after);
                return Ok(Settlement::Interrupted(InterruptReason::CartThrottled));
            }
            SubmitOutcome::Failed {
                codes,
                checkout_url,
            } => {
                if let (Some(url), Some(cart)) = (checkout_url, self.cart.as_mut()) {
                    cart.checkout_url = url.clone();
                }
                if codes.iter().any(|code| code == NOT_ENOUGH_STOCK_CODE) {
                    return Ok(Settlement::Interrupted(InterruptReason::NotEnoughStock));
                }
                if codes.iter().any(|code| code == OUT_OF_STOCK_CODE) {
                    return Ok(Settlement::Interrupted(InterruptReason::OutOfStock));
                }
            }
        }

        match outcome.into_redirect_url() {
            Ok(redirect_url) => Ok(Settlement::Submitted(redirect_url)),
            Err(error) => Ok(Settlement::Declined(error)),
        }
    }

    /// Re-applies a shipping method when a new address cleared the cart's
    /// delivery option selection.
    async fn reselect_delivery_options(&mut self, cart_id: &str) -> Result<()> {
        let Some(cart) = self.cart.as_ref() else {
            return Ok(());
        };
        if contact_adapter::selected_shipping_method(cart).is_some() {
            return Ok(());
        }

        let methods = contact_adapter::create_shipping_methods(cart);
        let method = self
            .selected_shipping_method
            .as_ref()
            .and_then(|previous| {
                methods
                    .iter()
                    .find(|method| method.identifier == previous.identifier)
            })
            .or_else(|| methods.first())
            .cloned();
        let Some(method) = method else {
            return Ok(());
        };

        for selection in &method.selections {
            let cart = self
                .cart_api
                .cart_selected_delivery_options_update(
                    cart_id,
                    &selection.delivery_group_id,
                    &selection.delivery_option_handle,
                )
                .await?;
            self.cart = Some(cart);
        }
        self.selected_shipping_method = Some(method);
        Ok(())
    }

    fn price_change(&self, cart: &Cart) -> Option<InterruptReason> {
        let shown = self.shown_total.as_ref()?;
        let total = &cart.cost.total_amount;
        if shown.currency_code != total.currency_code {
            Some(InterruptReason::CurrencyChanged)
        } else if shown.amount != total.amount {
            Some(InterruptReason::DynamicTax)
        } else {
            None
        }
    }

    async fn reopen_sheet(&mut self, errors: Vec<WalletFieldError>) -> AuthorizationResult {
        tracing::info!(
            "Returning {} field error(s) to the wallet sheet",
            errors.len()
        );
        self.transition(PaymentState::SheetPresented).await;
        self.shown_total = self.cart.as_ref().map(|cart| cart.cost.total_amount.clone());
        AuthorizationResult::failure(errors, self.summary())
    }

    async fn decline(&mut self, error: CheckoutError) -> AuthorizationResult {
        tracing::warn!("Payment authorization failed: {}", error);
        let summary = self.summary();
        self.transition(PaymentState::PaymentAuthorizationFailed {
            error: error.into(),
        })
        .await;
        self.close_sheet().await;
        AuthorizationResult::failure(Vec::new(), summary)
    }

    async fn close_sheet(&mut self) {
        self.sheet.dismiss().await;
        self.transition(PaymentState::Completed).await;
    }

    async fn fail(&mut self, error: CheckoutError) {
        tracing::error!("❌ Wallet payment failed: {}", error);
        tracing::debug!("Suggestion: {}", error.recovery_suggestion());
        self.transition(PaymentState::unexpected(error)).await;
    }

    async fn refresh_shipping_selection(&mut self) -> SheetUpdate {
        let Some(cart) = self.cart.as_ref() else {
            return self.sheet_update(Vec::new());
        };
        if let Some(method) = contact_adapter::selected_shipping_method(cart) {
            self.selected_shipping_method = Some(method);
            return self.sheet_update(Vec::new());
        }

        let methods = contact_adapter::create_shipping_methods(cart);
        let preferred = self
            .selected_shipping_method
            .as_ref()
            .and_then(|previous| {
                methods
                    .iter()
                    .find(|method| method.identifier == previous.identifier)
            })
            .or_else(|| methods.first())
            .cloned();
        match preferred {
            Some(method) => self.apply_shipping_method(method).await,
            None => {
                self.selected_shipping_method = None;
                self.sheet_update(Vec::new())
            }
        }
    }

    async fn apply_shipping_method(&mut self, method: ShippingMethod) -> SheetUpdate {
        let Some(cart_id) = self.cart.as_ref().map(|cart| cart.id.clone()) else {
            return self.sheet_update(Vec::new());
        };

        for selection in method.selections.clone() {
            let id = cart_id.clone();
            let task = self.spawn_mutation(move |api| async move {
                api.cart_selected_delivery_options_update(
                    &id,
                    &selection.delivery_group_id,
                    &selection.delivery_option_handle,
                )
                .await
            });
            match self
                .await_mutation("cartSelectedDeliveryOptionsUpdate", task)
                .await
            {
                None => return SheetUpdate::default(),
                Some(Ok(cart)) => self.cart = Some(cart),
                Some(Err(error)) => {
                    return self.reject_sheet_change(error, AddressRole::Shipping).await
                }
            }
        }

        tracing::debug!("Selected shipping method {}", method.identifier);
        self.selected_shipping_method = Some(method);
        self.sheet_update(Vec::new())
    }

    /// Field errors the sheet can show keep it open; anything else fails the
    /// session.
    async fn reject_sheet_change(
        &mut self,
        error: CheckoutError,
        role: AddressRole,
    ) -> SheetUpdate {
        if let Some(errors) = self.settings.error_map.translate(error.user_errors(), role) {
            tracing::info!(
                "Returning {} field error(s) to the wallet sheet",
                errors.len()
            );
            self.adopt_partial_cart(&error);
            return self.sheet_update(errors);
        }
        self.fail(error).await;
        SheetUpdate::default()
    }

    fn adopt_partial_cart(&mut self, error: &CheckoutError) {
        if let CheckoutError::ValidationError {
            cart: Some(cart), ..
        } = error
        {
            self.cart = Some(cart.as_ref().clone());
        }
    }

    fn accepts_sheet_event(&self, event: &str) -> bool {
        if self.state().kind() == PaymentStateKind::SheetPresented {
            return true;
        }
        tracing::warn!("Ignoring {} in state {}", event, self.state());
        false
    }

    fn summary(&self) -> Vec<SummaryLine> {
        let mut summary = contact_adapter::build_line_item_summary(
            self.cart.as_ref(),
            self.selected_shipping_method.as_ref(),
        );
        if !self.settings.merchant_display_name.is_empty() {
            if let Some(total) = summary.last_mut() {
                total.label = self.settings.merchant_display_name.clone();
            }
        }
        summary
    }

    fn sheet_update(&mut self, errors: Vec<WalletFieldError>) -> SheetUpdate {
        self.shown_total = self.cart.as_ref().map(|cart| cart.cost.total_amount.clone());
        SheetUpdate {
            summary: self.summary(),
            shipping_methods: self
                .cart
                .as_ref()
                .map(contact_adapter::create_shipping_methods)
                .unwrap_or_default(),
            errors,
        }
    }

    fn clear_session(&mut self) {
        self.selected_address_id = None;
        self.selected_shipping_method = None;
        self.shown_total = None;
        self.personal_data_written = false;
    }

    fn scrub_target(&self) -> Option<String> {
        if !self.personal_data_written {
            return None;
        }
        self.cart.as_ref().map(|cart| cart.id.clone())
    }

    async fn scrub_personal_data(&self, cart_id: Option<String>) {
        let Some(cart_id) = cart_id else {
            return;
        };
        match self.cart_api.cart_remove_personal_data(&cart_id).await {
            Ok(()) => tracing::debug!("Removed personal data from cart {}", cart_id),
            Err(error) => tracing::warn!(
                "Could not remove personal data from cart {}: {}",
                cart_id,
                error
            ),
        }
    }

    fn spawn_mutation<F, Fut>(&self, mutation: F) -> JoinHandle<Result<Cart>>
    where
        F: FnOnce(Arc<dyn CartApi>) -> Fut,
        Fut: Future<Output = Result<Cart>> + Send + 'static,
    {
        tokio::spawn(mutation(Arc::clone(&self.cart_api)))
    }

    /// Waits for a sheet-driven mutation. A cancel arriving first completes
    /// the session right away and returns `None`; the mutation still runs to
    /// the end and its cart is kept.
    async fn await_mutation(
        &mut self,
        operation: &str,
        mut task: JoinHandle<Result<Cart>>,
    ) -> Option<Result<Cart>> {
        let Some(mut signal) = self.cancel_signal.clone() else {
            return Some(flatten(task.await));
        };
        let handled = self.cancels_handled;

        let raced = tokio::select! {
            joined = &mut task => Raced::Finished(joined),
            _ = cancel_requested(&mut signal, handled) => Raced::Cancelled,
        };
        if let Raced::Finished(joined) = raced {
            return Some(flatten(joined));
        }

        let generation = *signal.borrow();
        let scrub = self.scrub_target();
        if !self.transition(PaymentState::Completed).await {
            return Some(flatten(task.await));
        }
        self.cancels_handled = generation;
        tracing::info!("🛑 Wallet payment cancelled while {} was in flight", operation);

        match flatten(task.await) {
            Ok(cart) => {
                tracing::debug!("Keeping cart returned by {} after cancel", operation);
                self.cart = Some(cart);
            }
            Err(error) => tracing::debug!("{} failed after cancel: {}", operation, error),
        }
        self.scrub_personal_data(scrub).await;
        None
    }
}

fn flatten(joined: std::result::Result<Result<Cart>, JoinError>) -> Result<Cart> {
    joined.unwrap_or_else(|error| Err(error.into()))
}

async fn cancel_requested(signal: &mut watch::Receiver<u64>, handled: u64) {
    // A closed channel can never deliver a cancel.
    if signal.wait_for(|generation| *generation > handled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
