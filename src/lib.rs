pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::cli::{LoggingSheet, StdoutPresenter};
pub use config::toml_config::TomlConfig;
pub use core::cart_client::StorefrontCartClient;
pub use core::event_queue::{spawn, OrchestratorHandle, WalletEvent};
pub use core::orchestrator::{WalletPaymentOrchestrator, WalletSettings};
pub use core::state_machine::{InterruptReason, PaymentState, PaymentStateKind};
pub use utils::error::{CheckoutError, Result};
