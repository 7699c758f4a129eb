//! Core of the Telegram notifier unit.
//!
//! The dispatch core is transport-agnostic: Telegram lives behind the
//! [`messaging::port::DeliveryPort`] implemented in the adapter crate.

pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod hook;
pub mod logging;
pub mod messaging;
pub mod notifier;
pub mod ports;
pub mod utils;

pub use errors::{ConfigError, Error, Result};
pub use notifier::Notifier;
pub use ports::{Availability, Unit, UnitOperationResult};
