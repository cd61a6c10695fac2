//! A minimal in-memory applet simulator.
//!
//! Implements just enough of the card side (SELECT, INIT, PAIR, OPEN SECURE
//! CHANNEL, MUTUALLY AUTHENTICATE and a few protected commands) to drive the
//! client through complete protocol runs. Unknown protected instructions
//! echo their plaintext back, which the round-trip tests rely on.

use bytes::Bytes;
use cipher::{Iv, Key};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use rand::RngCore;

use walletlite::crypto::{
    calculate_cryptogram, calculate_mac, decrypt_data, derive_session_keys, encrypt_data,
    generate_ecdh_shared_secret, generate_pairing_token, ApduMeta, WalletScp,
};
use walletlite_apdu_core::{CardTransport, Error as ApduError};

pub const CARD_PIN: &str = "123456";
pub const CARD_PUK: &str = "123456789012";
pub const PAIRING_PASSWORD: &str = "WalletAppletTest";

const SW_OK: [u8; 2] = [0x90, 0x00];

struct CardSession {
    enc: Key<WalletScp>,
    mac: Key<WalletScp>,
    iv: Iv<WalletScp>,
    authenticated: bool,
}

pub struct CardSim {
    key: SecretKey,
    pin: String,
    pairing_token: Option<[u8; 32]>,
    pairings: [Option<[u8; 32]>; 5],
    pair_challenge: Option<[u8; 32]>,
    session: Option<CardSession>,
    pin_verified: bool,
    pin_attempts: u8,
}

impl CardSim {
    /// A card that has been initialized with the test PIN and pairing
    /// password.
    pub fn initialized() -> Self {
        Self {
            key: SecretKey::random(&mut rand_v8::thread_rng()),
            pin: CARD_PIN.to_string(),
            pairing_token: Some(generate_pairing_token(PAIRING_PASSWORD)),
            pairings: [None; 5],
            pair_challenge: None,
            session: None,
            pin_verified: false,
            pin_attempts: 3,
        }
    }

    /// A factory-fresh card waiting for INIT.
    pub fn virgin() -> Self {
        Self {
            pairing_token: None,
            pin: String::new(),
            ..Self::initialized()
        }
    }

    /// How many pairing slots are in use.
    pub fn pairing_count(&self) -> usize {
        self.pairings.iter().flatten().count()
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.key
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    fn select(&mut self) -> Vec<u8> {
        self.session = None;
        self.pin_verified = false;

        let key = self.public_key_bytes();
        let mut response = if self.pairing_token.is_some() {
            // Application-info template with the public key TLV at its
            // fixed offset.
            let mut data = vec![0u8; 22];
            data[0] = 0xA4;
            data[1] = 0x10;
            data[21] = key.len() as u8;
            data.extend_from_slice(&key);
            data
        } else {
            let mut data = vec![0x80, key.len() as u8];
            data.extend_from_slice(&key);
            data
        };
        response.extend_from_slice(&SW_OK);
        response
    }

    fn init(&mut self, data: &[u8]) -> Vec<u8> {
        if self.pairing_token.is_some() {
            return vec![0x6D, 0x00];
        }
        if data.len() < 1 + 65 + 16 || data[0] != 65 {
            return vec![0x6A, 0x80];
        }

        let host_public = match k256::PublicKey::from_sec1_bytes(&data[1..66]) {
            Ok(key) => key,
            Err(_) => return vec![0x6A, 0x80],
        };
        let secret = generate_ecdh_shared_secret(&self.key, &host_public);
        let key = Key::<WalletScp>::clone_from_slice(secret.as_slice());
        let iv = Iv::<WalletScp>::clone_from_slice(&data[66..82]);

        let plaintext = match decrypt_data(&data[82..], &key, &iv) {
            Ok(plaintext) => plaintext,
            Err(_) => return vec![0x6A, 0x80],
        };
        if plaintext.len() != 6 + 12 + 32 {
            return vec![0x6A, 0x80];
        }

        self.pin = String::from_utf8_lossy(&plaintext[..6]).into_owned();
        let mut token = [0u8; 32];
        token.copy_from_slice(&plaintext[18..]);
        self.pairing_token = Some(token);
        SW_OK.to_vec()
    }

    fn pair(&mut self, p1: u8, data: &[u8]) -> Vec<u8> {
        let Some(token) = self.pairing_token else {
            return vec![0x69, 0x85];
        };

        match p1 {
            0x00 => {
                if data.len() != 32 {
                    return vec![0x6A, 0x80];
                }
                let mut card_challenge = [0u8; 32];
                rand::rng().fill_bytes(&mut card_challenge);
                self.pair_challenge = Some(card_challenge);

                let mut response = calculate_cryptogram(&token, data).to_vec();
                response.extend_from_slice(&card_challenge);
                response.extend_from_slice(&SW_OK);
                response
            }
            0x01 => {
                let Some(card_challenge) = self.pair_challenge.take() else {
                    return vec![0x69, 0x85];
                };
                if data != calculate_cryptogram(&token, &card_challenge) {
                    return vec![0x69, 0x82];
                }
                let Some(index) = self.pairings.iter().position(Option::is_none) else {
                    return vec![0x6A, 0x84];
                };

                let mut salt = [0u8; 32];
                rand::rng().fill_bytes(&mut salt);
                self.pairings[index] = Some(calculate_cryptogram(&token, &salt));

                let mut response = vec![index as u8];
                response.extend_from_slice(&salt);
                response.extend_from_slice(&SW_OK);
                response
            }
            _ => vec![0x6A, 0x86],
        }
    }

    fn open_secure_channel(&mut self, p1: u8, data: &[u8]) -> Vec<u8> {
        let Some(pairing_key) = self.pairings.get(p1 as usize).copied().flatten() else {
            return vec![0x6A, 0x88];
        };
        let Ok(host_public) = k256::PublicKey::from_sec1_bytes(data) else {
            return vec![0x6A, 0x80];
        };

        let secret = generate_ecdh_shared_secret(&self.key, &host_public);

        let mut salt = [0u8; 32];
        rand::rng().fill_bytes(&mut salt);
        let mut iv = Iv::<WalletScp>::default();
        rand::rng().fill_bytes(&mut iv);

        let (enc, mac) = derive_session_keys(&secret, &pairing_key, &salt);
        self.session = Some(CardSession {
            enc,
            mac,
            iv,
            authenticated: false,
        });
        self.pin_verified = false;

        let mut response = salt.to_vec();
        response.extend_from_slice(&iv);
        response.extend_from_slice(&SW_OK);
        response
    }

    /// Handle a protected command: unwrap, dispatch, wrap the reply.
    fn protected(&mut self, cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Vec<u8> {
        if self.session.is_none() {
            return vec![0x69, 0x82];
        }
        if data.len() < 16 {
            self.session = None;
            return vec![0x69, 0x82];
        }

        let (received_mac, ciphertext) = data.split_at(16);
        let plaintext = {
            let session = self.session.as_mut().unwrap();

            let mut meta = ApduMeta::default();
            meta[0] = cla;
            meta[1] = ins;
            meta[2] = p1;
            meta[3] = p2;
            meta[4] = data.len() as u8;

            let tag = calculate_mac(&meta, ciphertext, &session.mac);
            if tag.as_slice() != received_mac {
                self.session = None;
                return vec![0x69, 0x82];
            }

            let decrypt_iv = session.iv;
            session.iv = tag;
            match decrypt_data(ciphertext, &session.enc, &decrypt_iv) {
                Ok(plaintext) => plaintext,
                Err(_) => {
                    self.session = None;
                    return vec![0x69, 0x82];
                }
            }
        };

        let (reply, sw) = self.dispatch(ins, p1, &plaintext);
        self.wrap_response(&reply, sw)
    }

    /// Execute the decrypted command and produce the plaintext reply.
    fn dispatch(&mut self, ins: u8, p1: u8, data: &[u8]) -> (Vec<u8>, [u8; 2]) {
        let session = self.session.as_mut().unwrap();

        if ins == 0x11 {
            if data.len() != 32 {
                return (Vec::new(), [0x6A, 0x80]);
            }
            session.authenticated = true;
            let mut challenge = [0u8; 32];
            rand::rng().fill_bytes(&mut challenge);
            return (challenge.to_vec(), SW_OK);
        }
        if !session.authenticated {
            return (Vec::new(), [0x69, 0x85]);
        }

        match ins {
            // VERIFY PIN
            0x20 => {
                if data == self.pin.as_bytes() {
                    self.pin_verified = true;
                    self.pin_attempts = 3;
                    (Vec::new(), SW_OK)
                } else {
                    self.pin_attempts = self.pin_attempts.saturating_sub(1);
                    (Vec::new(), [0x63, 0xC0 | self.pin_attempts])
                }
            }
            // UNPAIR
            0x13 => {
                if !self.pin_verified {
                    return (Vec::new(), [0x69, 0x85]);
                }
                match self.pairings.get_mut(p1 as usize) {
                    Some(slot) => {
                        *slot = None;
                        (Vec::new(), SW_OK)
                    }
                    None => (Vec::new(), [0x6A, 0x86]),
                }
            }
            // Anything else echoes its plaintext, capped so the wrapped
            // reply stays within a short APDU.
            _ => {
                let cap = data.len().min(200);
                (data[..cap].to_vec(), SW_OK)
            }
        }
    }

    fn wrap_response(&mut self, data: &[u8], sw: [u8; 2]) -> Vec<u8> {
        let session = self.session.as_mut().unwrap();

        let mut plaintext = data.to_vec();
        plaintext.extend_from_slice(&sw);

        let ciphertext = encrypt_data(&plaintext, &session.enc, &session.iv);
        let mut meta = ApduMeta::default();
        meta[0] = (ciphertext.len() + 16) as u8;
        let tag = calculate_mac(&meta, &ciphertext, &session.mac);
        session.iv = tag;

        let mut response = tag.to_vec();
        response.extend_from_slice(&ciphertext);
        response.extend_from_slice(&SW_OK);
        response
    }
}

impl CardTransport for CardSim {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, ApduError> {
        if command.len() < 4 {
            return Err(ApduError::Parse("command shorter than a header"));
        }
        let (cla, ins, p1, p2) = (command[0], command[1], command[2], command[3]);
        let data = if command.len() > 5 {
            &command[5..]
        } else {
            &[]
        };

        let response = match (cla, ins) {
            (0x00, 0xA4) => self.select(),
            (0x80, 0xFE) => self.init(data),
            (0x80, 0x12) => self.pair(p1, data),
            (0x80, 0x10) => self.open_secure_channel(p1, data),
            (0x80, _) => self.protected(cla, ins, p1, p2, data),
            _ => vec![0x6D, 0x00],
        };

        Ok(Bytes::from(response))
    }

    fn reset(&mut self) -> Result<(), ApduError> {
        self.session = None;
        self.pin_verified = false;
        Ok(())
    }
}
