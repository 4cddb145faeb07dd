//! Relay address conventions
//!
//! `<name>_snd` publishes a stream, `<name>_rec` views the stream published
//! on `<name>_snd`. Everything else is a plain rendezvous address.

/// Suffix registering a source
pub const SENDER_SUFFIX: &str = "_snd";

/// Suffix registering a sink
pub const RECEIVER_SUFFIX: &str = "_rec";

/// Meaning of an address under relay rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Sender,
    Receiver,
    Plain,
}

impl AddressKind {
    /// Classify `address` by its suffix
    pub fn of(address: &str) -> Self {
        if address.ends_with(SENDER_SUFFIX) {
            AddressKind::Sender
        } else if address.ends_with(RECEIVER_SUFFIX) {
            AddressKind::Receiver
        } else {
            AddressKind::Plain
        }
    }
}

/// Sender address belonging to a sender or receiver address
///
/// Replaces the last four characters with `_snd`, whatever they are.
pub fn to_sender_address(address: &str) -> String {
    let keep = address.chars().count().saturating_sub(SENDER_SUFFIX.len());
    let mut sender: String = address.chars().take(keep).collect();
    sender.push_str(SENDER_SUFFIX);
    sender
}

/// Address length as counted against `max_address_length`
pub fn address_len(address: &str) -> usize {
    address.chars().count()
}
