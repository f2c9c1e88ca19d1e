pub mod cart_client;
pub mod cart_queries;
pub mod contact_adapter;
pub mod error_mapping;
pub mod event_queue;
pub mod orchestrator;
pub mod state_machine;

pub use crate::domain::ports::{CartApi, CheckoutPresenter, ConfigProvider, WalletSheet};
pub use crate::utils::error::Result;
