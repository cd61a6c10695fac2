use base64::prelude::*;
use rand::{Rng, RngCore};
use zeroize::Zeroize;

use crate::crypto::{generate_pairing_token, PairingToken};

const MAX_PUK_NUMBER: u64 = 999_999_999_999;
const MAX_PIN_NUMBER: u64 = 999_999;
const PIN_LENGTH: usize = 6;
const PUK_LENGTH: usize = 12;

/// The secret data needed to initialize and pair with a card.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Secrets {
    pin: String,
    puk: String,
    pairing_pass: String,
    pairing_token: PairingToken,
}

impl Secrets {
    /// Creates a new Secrets instance with the provided PIN, PUK and pairing
    /// password.
    ///
    /// # Panics
    /// Panics if the PIN is not 6 digits or the PUK is not 12 digits.
    pub fn new(pin: &str, puk: &str, pairing_pass: &str) -> Self {
        assert_eq!(
            pin.len(),
            PIN_LENGTH,
            "PIN must be exactly {} digits",
            PIN_LENGTH
        );
        assert_eq!(
            puk.len(),
            PUK_LENGTH,
            "PUK must be exactly {} digits",
            PUK_LENGTH
        );

        Self {
            pin: pin.to_string(),
            puk: puk.to_string(),
            pairing_pass: pairing_pass.to_string(),
            pairing_token: generate_pairing_token(pairing_pass),
        }
    }

    /// Generates a new Secrets with random PIN, PUK and pairing password.
    pub fn generate() -> Self {
        let pairing_pass = generate_pairing_pass();

        let mut rng = rand::rng();
        let puk = rng.random_range(0..MAX_PUK_NUMBER);
        let pin = rng.random_range(0..MAX_PIN_NUMBER);

        Self {
            pin: format!("{:06}", pin),
            puk: format!("{:012}", puk),
            pairing_token: generate_pairing_token(&pairing_pass),
            pairing_pass,
        }
    }

    /// Returns the PIN string
    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// Returns the PUK string
    pub fn puk(&self) -> &str {
        &self.puk
    }

    /// Returns the pairing password string
    pub fn pairing_pass(&self) -> &str {
        &self.pairing_pass
    }

    /// Returns the pairing token derived from the pairing password
    pub fn pairing_token(&self) -> &PairingToken {
        &self.pairing_token
    }
}

fn generate_pairing_pass() -> String {
    let mut random = [0u8; 12];
    rand::rng().fill_bytes(&mut random);
    BASE64_URL_SAFE_NO_PAD.encode(random)
}
