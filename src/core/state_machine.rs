//! Wallet payment lifecycle.
//!
//! Whether a transition is allowed depends only on the source and target tags,
//! except between error states, where the carried error instance also counts.
//! Rejected transitions are logged and leave the state untouched; they never
//! panic or return an error, since stale sheet callbacks are expected.

use crate::domain::model::PaymentToken;
use crate::utils::error::CheckoutError;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Shared handle to the error that drove the flow into a failure state.
///
/// Two `StateError`s are equal only when they point at the same error
/// instance.
#[derive(Debug, Clone)]
pub struct StateError(Arc<CheckoutError>);

impl StateError {
    pub fn new(error: CheckoutError) -> Self {
        Self(Arc::new(error))
    }

    pub fn error(&self) -> &CheckoutError {
        &self.0
    }
}

impl PartialEq for StateError {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<CheckoutError> for StateError {
    fn from(error: CheckoutError) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why the wallet flow was abandoned in favour of the web checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptReason {
    CurrencyChanged,
    DynamicTax,
    CartNotReady,
    NotEnoughStock,
    OutOfStock,
    CartThrottled,
    Other,
    Unhandled,
}

impl InterruptReason {
    /// Query parameter appended to the checkout URL on hand-off, if any.
    pub fn query_parameter(self) -> Option<&'static str> {
        match self {
            InterruptReason::CurrencyChanged => Some("wallet_currency_change"),
            InterruptReason::DynamicTax => Some("wallet_dynamic_tax"),
            InterruptReason::CartNotReady => Some("wallet_cart_not_ready"),
            InterruptReason::NotEnoughStock => Some("wallet_not_enough_stock"),
            InterruptReason::OutOfStock
            | InterruptReason::CartThrottled
            | InterruptReason::Other
            | InterruptReason::Unhandled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentStateKind {
    Idle,
    StartPaymentRequest,
    SheetPresented,
    PaymentAuthorized,
    PaymentAuthorizationFailed,
    CartSubmittedForCompletion,
    Interrupt,
    UnexpectedError,
    TerminalError,
    PresentingFallback,
    Completed,
    Reset,
}

impl PaymentStateKind {
    pub const ALL: [PaymentStateKind; 12] = [
        PaymentStateKind::Idle,
        PaymentStateKind::StartPaymentRequest,
        PaymentStateKind::SheetPresented,
        PaymentStateKind::PaymentAuthorized,
        PaymentStateKind::PaymentAuthorizationFailed,
        PaymentStateKind::CartSubmittedForCompletion,
        PaymentStateKind::Interrupt,
        PaymentStateKind::UnexpectedError,
        PaymentStateKind::TerminalError,
        PaymentStateKind::PresentingFallback,
        PaymentStateKind::Completed,
        PaymentStateKind::Reset,
    ];

    pub fn is_error(self) -> bool {
        matches!(
            self,
            PaymentStateKind::UnexpectedError | PaymentStateKind::TerminalError
        )
    }

    /// Transition table over tags, without the error-escape rule.
    fn table_allows(self, to: PaymentStateKind) -> bool {
        use PaymentStateKind::*;

        match self {
            Idle => matches!(to, StartPaymentRequest),
            StartPaymentRequest => matches!(to, SheetPresented | Reset | Completed),
            SheetPresented => matches!(
                to,
                PaymentAuthorized | PaymentAuthorizationFailed | Interrupt | Completed
            ),
            PaymentAuthorized => matches!(
                to,
                CartSubmittedForCompletion | PaymentAuthorizationFailed | Interrupt | SheetPresented
            ),
            PaymentAuthorizationFailed => matches!(to, Completed | Reset),
            CartSubmittedForCompletion => matches!(to, Completed),
            Interrupt => matches!(to, Completed),
            PresentingFallback => matches!(to, Completed),
            Completed => matches!(to, PresentingFallback | Reset),
            Reset => matches!(to, Idle),
            UnexpectedError => matches!(to, Completed | TerminalError),
            TerminalError => matches!(to, Completed),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentState {
    Idle,
    StartPaymentRequest,
    SheetPresented,
    PaymentAuthorized { token: PaymentToken },
    PaymentAuthorizationFailed { error: StateError },
    CartSubmittedForCompletion { redirect_url: Url },
    Interrupt { reason: InterruptReason },
    UnexpectedError { error: StateError },
    TerminalError { error: StateError },
    PresentingFallback { url: Option<Url> },
    Completed,
    Reset,
}

impl PaymentState {
    pub fn unexpected(error: impl Into<StateError>) -> Self {
        PaymentState::UnexpectedError {
            error: error.into(),
        }
    }

    pub fn terminal(error: impl Into<StateError>) -> Self {
        PaymentState::TerminalError {
            error: error.into(),
        }
    }

    pub fn kind(&self) -> PaymentStateKind {
        match self {
            PaymentState::Idle => PaymentStateKind::Idle,
            PaymentState::StartPaymentRequest => PaymentStateKind::StartPaymentRequest,
            PaymentState::SheetPresented => PaymentStateKind::SheetPresented,
            PaymentState::PaymentAuthorized { .. } => PaymentStateKind::PaymentAuthorized,
            PaymentState::PaymentAuthorizationFailed { .. } => {
                PaymentStateKind::PaymentAuthorizationFailed
            }
            PaymentState::CartSubmittedForCompletion { .. } => {
                PaymentStateKind::CartSubmittedForCompletion
            }
            PaymentState::Interrupt { .. } => PaymentStateKind::Interrupt,
            PaymentState::UnexpectedError { .. } => PaymentStateKind::UnexpectedError,
            PaymentState::TerminalError { .. } => PaymentStateKind::TerminalError,
            PaymentState::PresentingFallback { .. } => PaymentStateKind::PresentingFallback,
            PaymentState::Completed => PaymentStateKind::Completed,
            PaymentState::Reset => PaymentStateKind::Reset,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind().is_error()
    }

    /// The error carried by this state, if any.
    pub fn error(&self) -> Option<&StateError> {
        match self {
            PaymentState::PaymentAuthorizationFailed { error }
            | PaymentState::UnexpectedError { error }
            | PaymentState::TerminalError { error } => Some(error),
            _ => None,
        }
    }

    pub fn carries_error(&self) -> bool {
        self.error().is_some()
    }

    pub fn can_transition(&self, to: &PaymentState) -> bool {
        let from_kind = self.kind();
        let to_kind = to.kind();

        if to_kind.is_error() {
            // Any state may escape into an error; between error states the
            // target must be a different state instance.
            return !(from_kind == to_kind && self.error() == to.error());
        }
        from_kind.table_allows(to_kind)
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentState::PaymentAuthorizationFailed { error }
            | PaymentState::UnexpectedError { error }
            | PaymentState::TerminalError { error } => write!(f, "{:?}({})", self.kind(), error),
            PaymentState::CartSubmittedForCompletion { redirect_url } => {
                write!(f, "{:?}({})", self.kind(), redirect_url)
            }
            PaymentState::Interrupt { reason } => write!(f, "{:?}({:?})", self.kind(), reason),
            PaymentState::PresentingFallback { url: Some(url) } => {
                write!(f, "{:?}({})", self.kind(), url)
            }
            _ => write!(f, "{:?}", self.kind()),
        }
    }
}

/// Holds the current state and applies validated transitions.
#[derive(Debug)]
pub struct PaymentStateMachine {
    state: PaymentState,
    log: Vec<PaymentStateKind>,
}

impl Default for PaymentStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentStateMachine {
    pub fn new() -> Self {
        Self {
            state: PaymentState::Idle,
            log: vec![PaymentStateKind::Idle],
        }
    }

    pub fn state(&self) -> &PaymentState {
        &self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn log(&self) -> &[PaymentStateKind] {
        &self.log
    }

    /// Replaces the state when the table allows it and returns the previous
    /// one. A rejected transition returns `None` and changes nothing.
    pub fn apply(&mut self, next: PaymentState) -> Option<PaymentState> {
        if !self.state.can_transition(&next) {
            tracing::warn!(
                "Ignoring invalid payment state transition {} -> {}",
                self.state,
                next
            );
            return None;
        }

        tracing::info!("Payment state {} -> {}", self.state, next);
        self.log.push(next.kind());
        Some(std::mem::replace(&mut self.state, next))
    }
}
