//! Single-consumer queue feeding wallet sheet events to an orchestrator.
//!
//! Events are applied one at a time in arrival order. User cancellation
//! travels on a separate `watch` channel so it can interrupt a cart mutation
//! that is already in flight instead of waiting behind it.

use crate::core::orchestrator::WalletPaymentOrchestrator;
use crate::domain::model::{
    AuthorizationResult, CartSource, PaymentAuthorization, SheetUpdate, WalletContact,
};
use crate::utils::error::{CheckoutError, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// A callback from the wallet sheet, with a channel for the reply the sheet
/// is waiting on.
#[derive(Debug)]
pub enum WalletEvent {
    Start {
        source: CartSource,
        reply: oneshot::Sender<bool>,
    },
    SheetPresented {
        reply: oneshot::Sender<bool>,
    },
    ContactSelected {
        contact: WalletContact,
        reply: oneshot::Sender<SheetUpdate>,
    },
    ShippingMethodSelected {
        identifier: String,
        reply: oneshot::Sender<SheetUpdate>,
    },
    PaymentAuthorized {
        authorization: PaymentAuthorization,
        reply: oneshot::Sender<AuthorizationResult>,
    },
}

impl WalletEvent {
    fn name(&self) -> &'static str {
        match self {
            WalletEvent::Start { .. } => "start",
            WalletEvent::SheetPresented { .. } => "sheet_presented",
            WalletEvent::ContactSelected { .. } => "contact_selected",
            WalletEvent::ShippingMethodSelected { .. } => "shipping_method_selected",
            WalletEvent::PaymentAuthorized { .. } => "payment_authorized",
        }
    }
}

/// Cloneable sender side of a running session.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    events: mpsc::UnboundedSender<WalletEvent>,
    cancel: Arc<watch::Sender<u64>>,
}

impl OrchestratorHandle {
    pub async fn start(&self, source: CartSource) -> Result<bool> {
        self.request(|reply| WalletEvent::Start { source, reply })
            .await
    }

    pub async fn sheet_presented(&self) -> Result<bool> {
        self.request(|reply| WalletEvent::SheetPresented { reply })
            .await
    }

    pub async fn contact_selected(&self, contact: WalletContact) -> Result<SheetUpdate> {
        self.request(|reply| WalletEvent::ContactSelected { contact, reply })
            .await
    }

    pub async fn shipping_method_selected(
        &self,
        identifier: impl Into<String>,
    ) -> Result<SheetUpdate> {
        let identifier = identifier.into();
        self.request(|reply| WalletEvent::ShippingMethodSelected { identifier, reply })
            .await
    }

    pub async fn payment_authorized(
        &self,
        authorization: PaymentAuthorization,
    ) -> Result<AuthorizationResult> {
        self.request(|reply| WalletEvent::PaymentAuthorized {
            authorization,
            reply,
        })
        .await
    }

    /// Signals that the buyer dismissed the sheet. Takes effect immediately,
    /// even while a cart mutation is in flight.
    pub fn user_cancelled(&self) {
        tracing::debug!("User cancel signalled");
        self.cancel.send_modify(|generation| *generation += 1);
    }

    async fn request<T>(
        &self,
        event: impl FnOnce(oneshot::Sender<T>) -> WalletEvent,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(event(reply))
            .map_err(|_| CheckoutError::SessionClosed)?;
        response.await.map_err(|_| CheckoutError::SessionClosed)
    }
}

/// Runs `orchestrator` on its own task. The task ends once every handle is
/// dropped and hands the orchestrator back for inspection.
pub fn spawn(
    mut orchestrator: WalletPaymentOrchestrator,
) -> (OrchestratorHandle, JoinHandle<WalletPaymentOrchestrator>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = watch::channel(0u64);
    orchestrator.attach_cancel_signal(cancel_rx.clone());

    let task = tokio::spawn(run(orchestrator, events_rx, cancel_rx));
    let handle = OrchestratorHandle {
        events: events_tx,
        cancel: Arc::new(cancel_tx),
    };
    (handle, task)
}

async fn run(
    mut orchestrator: WalletPaymentOrchestrator,
    mut events: mpsc::UnboundedReceiver<WalletEvent>,
    mut cancel: watch::Receiver<u64>,
) -> WalletPaymentOrchestrator {
    let mut cancel_open = true;

    loop {
        // A cancel signalled before an event was sent is applied first.
        tokio::select! {
            biased;
            changed = cancel.changed(), if cancel_open => {
                if changed.is_err() {
                    cancel_open = false;
                }
            }
            event = events.recv() => match event {
                Some(event) => dispatch(&mut orchestrator, event).await,
                None => break,
            },
        }
        orchestrator.apply_pending_cancel().await;
    }

    tracing::debug!(
        "Wallet session queue closed in state {}",
        orchestrator.state()
    );
    orchestrator
}

async fn dispatch(orchestrator: &mut WalletPaymentOrchestrator, event: WalletEvent) {
    let name = event.name();
    tracing::debug!("Processing wallet event {}", name);

    // A dropped reply receiver only means the caller stopped waiting.
    let delivered = match event {
        WalletEvent::Start { source, reply } => reply.send(orchestrator.start(source).await).is_ok(),
        WalletEvent::SheetPresented { reply } => {
            reply.send(orchestrator.on_sheet_presented().await).is_ok()
        }
        WalletEvent::ContactSelected { contact, reply } => reply
            .send(orchestrator.on_contact_selected(contact).await)
            .is_ok(),
        WalletEvent::ShippingMethodSelected { identifier, reply } => reply
            .send(orchestrator.on_shipping_method_selected(&identifier).await)
            .is_ok(),
        WalletEvent::PaymentAuthorized {
            authorization,
            reply,
        } => reply
            .send(orchestrator.on_payment_authorized(authorization).await)
            .is_ok(),
    };

    if !delivered {
        tracing::debug!("Reply to {} was not received", name);
    }
}
