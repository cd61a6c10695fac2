use crate::constants::PAIRING_MAX_CLIENT_COUNT;
use crate::error::Error;

/// A long-lived pairing with one of the card's client slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingInfo {
    /// The pairing key shared with the card.
    pub key: [u8; 32],
    /// The slot index assigned by the card, 0 to 4.
    pub index: u8,
}

impl PairingInfo {
    /// Serialize as the persisted form `index ‖ key`.
    pub fn to_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = self.index;
        out[1..].copy_from_slice(&self.key);
        out
    }

    /// Parse the persisted form `index ‖ key`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 33 {
            return Err(Error::InvalidInput("pairing blob must be 33 bytes"));
        }
        if bytes[0] >= PAIRING_MAX_CLIENT_COUNT {
            return Err(Error::InvalidInput("pairing index out of range"));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[1..]);
        Ok(Self {
            key,
            index: bytes[0],
        })
    }
}
