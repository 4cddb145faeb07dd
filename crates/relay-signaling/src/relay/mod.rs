//! Address registry and admission policy

pub mod address;
pub mod controller;
pub mod listeners;

pub use address::{to_sender_address, AddressKind, RECEIVER_SUFFIX, SENDER_SUFFIX};
pub use controller::{Admission, RelayController};
pub use listeners::ListenerTable;
