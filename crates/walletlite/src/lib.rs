//! Client library for the Status hardware wallet applet.
//!
//! The applet manages BIP32 keys on a smart card and exposes its commands
//! over ISO 7816 APDUs. Everything beyond SELECT and INIT runs inside an
//! authenticated, encrypted secure channel established over an
//! ECDH-bootstrapped pairing.
//!
//! The typical flow:
//!
//! ```no_run
//! use walletlite::CommandSet;
//! # fn run(transport: impl walletlite_apdu_core::CardTransport) -> walletlite::Result<()> {
//! let mut card = CommandSet::new(transport);
//!
//! card.select()?;
//! card.auto_pair("the-pairing-password")?;
//! card.auto_open_secure_channel()?;
//!
//! card.verify_pin("123456")?.require_success()?;
//! let signature = card.sign(&[0u8; 32])?;
//! # Ok(())
//! # }
//! ```
//!
//! The pairing survives the session: persist
//! [`pairing_info`](CommandSet::pairing_info) and restore it with
//! [`CommandSet::with_pairing_info`] to skip `auto_pair` next time.

pub mod command_set;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod secrets;
pub mod secure_channel;
pub mod session;
pub mod types;

pub use command_set::{CommandSet, DeriveSource};
pub use error::{Error, Result};
pub use secrets::Secrets;
pub use secure_channel::SecureChannelSession;
pub use session::Session;
pub use types::{KeyPath, PairingInfo};

pub use constants::APPLET_AID;
