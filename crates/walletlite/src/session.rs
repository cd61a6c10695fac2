//! Session state for an open secure channel.
//!
//! A [`Session`] value only exists while the channel is open, so holding one
//! is the static proof that session keys and a chaining IV are available.

use cipher::{Iv, Key};
use zeroize::Zeroize;

use crate::crypto::{calculate_mac, ApduMeta, WalletScp};

/// Session keys derived on OPEN SECURE CHANNEL.
#[derive(Clone)]
pub struct Keys {
    /// Encryption key
    enc: Key<WalletScp>,
    /// MAC key
    mac: Key<WalletScp>,
}

impl Keys {
    /// Create a new key set with the specified encryption and MAC keys.
    pub(crate) fn new(enc: Key<WalletScp>, mac: Key<WalletScp>) -> Self {
        Self { enc, mac }
    }

    /// Get the encryption key
    pub(crate) fn enc(&self) -> &Key<WalletScp> {
        &self.enc
    }

    /// Get the MAC key
    pub(crate) fn mac(&self) -> &Key<WalletScp> {
        &self.mac
    }
}

impl Zeroize for Keys {
    fn zeroize(&mut self) {
        self.enc.as_mut_slice().zeroize();
        self.mac.as_mut_slice().zeroize();
    }
}

impl Drop for Keys {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// The state of an open secure channel: session keys plus the chaining IV.
#[derive(Clone)]
pub struct Session {
    keys: Keys,
    iv: Iv<WalletScp>,
}

impl Session {
    pub(crate) fn new(keys: Keys, iv: Iv<WalletScp>) -> Self {
        Self { keys, iv }
    }

    /// Build a session from raw key material.
    ///
    /// Intended for tests and card simulators that need to mirror the state
    /// of a live channel.
    pub fn from_raw(
        enc_key: &Key<WalletScp>,
        mac_key: &Key<WalletScp>,
        iv: &Iv<WalletScp>,
    ) -> Self {
        Self {
            keys: Keys::new(*enc_key, *mac_key),
            iv: *iv,
        }
    }

    pub(crate) const fn keys(&self) -> &Keys {
        &self.keys
    }

    /// The current chaining IV.
    pub const fn iv(&self) -> &Iv<WalletScp> {
        &self.iv
    }

    /// Chain the IV forward: the CMAC of `meta ‖ data` becomes the new IV.
    pub(crate) fn update_iv(&mut self, meta: &ApduMeta, data: &[u8]) {
        self.iv = calculate_mac(meta, data, self.keys.mac());
    }
}
