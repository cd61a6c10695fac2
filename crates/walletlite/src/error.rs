//! Error types for the wallet applet client.

use thiserror::Error;
use walletlite_apdu_core::StatusWord;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the wallet applet client.
///
/// Application-level failures (wrong PIN, key not loaded, ...) are not errors:
/// they come back to the caller as the status word of the returned
/// [`Response`](walletlite_apdu_core::Response). Only transport problems,
/// secure-channel setup failures and broken invariants surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying transport failed. The secure channel session, if any,
    /// has been closed.
    #[error(transparent)]
    Transport(#[from] walletlite_apdu_core::Error),

    /// The card answered with a shape the client does not recognize.
    #[error("unexpected response from the card")]
    UnexpectedResponse,

    /// OPEN SECURE CHANNEL was rejected.
    #[error("OPEN SECURE CHANNEL failed: {0}")]
    OpenFailed(StatusWord),

    /// MUTUALLY AUTHENTICATE failed or returned an invalid payload.
    #[error("MUTUALLY AUTHENTICATE failed")]
    MutualAuthFailed,

    /// The first PAIR step was rejected.
    #[error("pairing failed on step 1: {0}")]
    PairStep1Failed(StatusWord),

    /// The second PAIR step was rejected.
    #[error("pairing failed on step 2: {0}")]
    PairStep2Failed(StatusWord),

    /// The card's pairing cryptogram did not match the shared secret.
    #[error("invalid card cryptogram")]
    BadCardCryptogram,

    /// UNPAIR was rejected.
    #[error("unpairing failed: {0}")]
    UnpairFailed(StatusWord),

    /// The MAC of a protected response did not verify. The session has been
    /// closed and must be re-opened.
    #[error("invalid MAC in card response")]
    InvalidMac,

    /// A cryptographic primitive failed.
    #[error("cryptographic error: {0}")]
    Crypto(&'static str),

    /// A caller-supplied argument violates a documented precondition.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}
