//! The secure channel session: pairing, establishment and APDU framing.
//!
//! One [`SecureChannelSession`] mirrors the card-side channel state. It moves
//! through three stages: nothing known, card key ingested (ECDH secret
//! available), and open (session keys plus chaining IV held in a
//! [`Session`]). Every wrapped exchange advances the IV on both sides, so a
//! session must be driven strictly in request/response order.

use bytes::{BufMut, Bytes, BytesMut};
use cipher::Iv;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use walletlite_apdu_core::{status, CardTransport, Command, Response};

use crate::constants::{
    CLA_GP, INS_MUTUALLY_AUTHENTICATE, INS_OPEN_SECURE_CHANNEL, INS_PAIR, INS_UNPAIR,
    PAIRING_MAX_CLIENT_COUNT, PAIR_P1_FIRST_STEP, PAIR_P1_LAST_STEP, PAYLOAD_MAX_SIZE,
    SC_BLOCK_SIZE, SC_SECRET_LENGTH, UNCOMPRESSED_POINT_LENGTH,
};
use crate::crypto::{
    calculate_cryptogram, decrypt_data, derive_session_keys, encrypt_data,
    generate_ecdh_shared_secret, one_shot_encrypt, ApduMeta, Challenge, WalletScp,
};
use crate::error::{Error, Result};
use crate::session::{Keys, Session};
use crate::types::PairingInfo;

/// Host-side ECDH material generated when the card's public key is ingested.
struct Bootstrap {
    host_public_key: PublicKey,
    secret: Zeroizing<[u8; 32]>,
}

/// Client side of the secure channel with one card.
#[derive(Default)]
pub struct SecureChannelSession {
    bootstrap: Option<Bootstrap>,
    pairing: Option<PairingInfo>,
    session: Option<Session>,
}

impl SecureChannelSession {
    /// Create a session with no card key, pairing or open channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session reusing a previously persisted pairing.
    pub fn with_pairing_info(pairing: PairingInfo) -> Self {
        Self {
            bootstrap: None,
            pairing: Some(pairing),
            session: None,
        }
    }

    /// Whether the channel is currently open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// The active pairing, if any. Persist this between sessions.
    pub fn pairing_info(&self) -> Option<&PairingInfo> {
        self.pairing.as_ref()
    }

    /// Install a pairing restored from persistent storage.
    pub fn set_pairing_info(&mut self, pairing: PairingInfo) {
        self.pairing = Some(pairing);
    }

    /// The ephemeral public key generated for this session, if the card key
    /// has been ingested.
    pub fn host_public_key(&self) -> Option<&PublicKey> {
        self.bootstrap.as_ref().map(|b| &b.host_public_key)
    }

    /// Ingest the card public key returned by SELECT.
    ///
    /// Generates a fresh ephemeral keypair and runs ECDH with the card key.
    /// The ephemeral private key is dropped as soon as the shared secret
    /// exists. Any open channel is invalidated, since a re-select restarts
    /// the card-side channel as well.
    pub fn ingest_card_public_key(&mut self, key_data: &[u8]) -> Result<()> {
        if key_data.len() != UNCOMPRESSED_POINT_LENGTH {
            return Err(Error::Crypto("card public key must be a 65-byte uncompressed point"));
        }
        let card_public_key = PublicKey::from_sec1_bytes(key_data)
            .map_err(|_| Error::Crypto("card public key is not on secp256k1"))?;

        let host_private_key = SecretKey::random(&mut rand_v8::thread_rng());
        let secret = generate_ecdh_shared_secret(&host_private_key, &card_public_key);

        self.bootstrap = Some(Bootstrap {
            host_public_key: host_private_key.public_key(),
            secret,
        });
        self.session = None;
        Ok(())
    }

    /// Open the secure channel and mutually authenticate.
    pub fn auto_open_secure_channel(&mut self, transport: &mut dyn CardTransport) -> Result<()> {
        let (host_public, secret) = match &self.bootstrap {
            Some(bootstrap) => (
                bootstrap.host_public_key.to_encoded_point(false),
                bootstrap.secret.clone(),
            ),
            None => return Err(Error::InvalidInput("no card public key ingested")),
        };
        let pairing = self
            .pairing
            .clone()
            .ok_or(Error::InvalidInput("no pairing available"))?;

        // Any previous session is dead the moment we ask for a new one.
        self.session = None;

        let command = Command::new(CLA_GP, INS_OPEN_SECURE_CHANNEL, pairing.index, 0)
            .with_data(Bytes::copy_from_slice(host_public.as_bytes()));
        let response = self.transmit(transport, &command)?;

        if !response.status().is_success() {
            return Err(Error::OpenFailed(response.status()));
        }

        let data = response.data();
        if data.len() != SC_SECRET_LENGTH + SC_BLOCK_SIZE {
            return Err(Error::UnexpectedResponse);
        }

        let (enc_key, mac_key) =
            derive_session_keys(&secret, &pairing.key, &data[..SC_SECRET_LENGTH]);
        let iv = Iv::<WalletScp>::clone_from_slice(&data[SC_SECRET_LENGTH..]);
        self.session = Some(Session::new(Keys::new(enc_key, mac_key), iv));
        debug!(pairing_index = pairing.index, "secure channel open, authenticating");

        self.mutually_authenticate(transport)
    }

    /// Send MUTUALLY AUTHENTICATE over the freshly opened channel.
    fn mutually_authenticate(&mut self, transport: &mut dyn CardTransport) -> Result<()> {
        let mut challenge = Challenge::default();
        rand::rng().fill_bytes(&mut challenge);

        let command =
            self.protected_command(CLA_GP, INS_MUTUALLY_AUTHENTICATE, 0, 0, &challenge)?;
        let response = self.transmit(transport, &command)?;

        if !response.status().is_success() || response.data().len() != SC_SECRET_LENGTH {
            self.session = None;
            return Err(Error::MutualAuthFailed);
        }

        debug!("mutual authentication complete");
        Ok(())
    }

    /// Run the two-step pairing protocol against the shared pairing secret.
    ///
    /// On success the new pairing is stored and can be persisted via
    /// [`pairing_info`](Self::pairing_info).
    pub fn auto_pair(
        &mut self,
        transport: &mut dyn CardTransport,
        shared_secret: &[u8; 32],
    ) -> Result<()> {
        let mut challenge = Challenge::default();
        rand::rng().fill_bytes(&mut challenge);

        let command = Command::new(CLA_GP, INS_PAIR, PAIR_P1_FIRST_STEP, 0)
            .with_data(challenge.to_vec());
        let response = self.transmit(transport, &command)?;

        if !response.status().is_success() {
            return Err(Error::PairStep1Failed(response.status()));
        }
        let data = response.data();
        if data.len() != 2 * SC_SECRET_LENGTH {
            return Err(Error::UnexpectedResponse);
        }

        let (card_cryptogram, card_challenge) = data.split_at(SC_SECRET_LENGTH);
        if calculate_cryptogram(shared_secret, &challenge).as_slice() != card_cryptogram {
            return Err(Error::BadCardCryptogram);
        }

        let client_cryptogram = calculate_cryptogram(shared_secret, card_challenge);
        let command = Command::new(CLA_GP, INS_PAIR, PAIR_P1_LAST_STEP, 0)
            .with_data(client_cryptogram.to_vec());
        let response = self.transmit(transport, &command)?;

        if !response.status().is_success() {
            return Err(Error::PairStep2Failed(response.status()));
        }
        let data = response.data();
        if data.len() != 1 + SC_SECRET_LENGTH {
            return Err(Error::UnexpectedResponse);
        }

        let pairing = PairingInfo {
            key: calculate_cryptogram(shared_secret, &data[1..]),
            index: data[0],
        };
        debug!(pairing_index = pairing.index, "paired with card");
        self.pairing = Some(pairing);
        Ok(())
    }

    /// Release this client's pairing slot on the card.
    pub fn auto_unpair(&mut self, transport: &mut dyn CardTransport) -> Result<()> {
        let index = self
            .pairing
            .as_ref()
            .ok_or(Error::InvalidInput("no pairing available"))?
            .index;

        let command = self.protected_command(CLA_GP, INS_UNPAIR, index, 0, &[])?;
        let response = self.transmit(transport, &command)?;

        if !response.status().is_success() {
            return Err(Error::UnpairFailed(response.status()));
        }
        self.pairing = None;
        Ok(())
    }

    /// Release every pairing slot except our own.
    pub fn unpair_others(&mut self, transport: &mut dyn CardTransport) -> Result<()> {
        let own_index = self
            .pairing
            .as_ref()
            .ok_or(Error::InvalidInput("no pairing available"))?
            .index;

        for index in 0..PAIRING_MAX_CLIENT_COUNT {
            if index == own_index {
                continue;
            }
            let command = self.protected_command(CLA_GP, INS_UNPAIR, index, 0, &[])?;
            let response = self.transmit(transport, &command)?;
            if !response.status().is_success() {
                return Err(Error::UnpairFailed(response.status()));
            }
        }
        Ok(())
    }

    /// Build a command, wrapping it if the channel is open.
    ///
    /// When open, the plaintext is AES-CBC encrypted under the session key
    /// with the current IV, and the CMAC over the APDU header and ciphertext
    /// becomes both the leading MAC field and the next IV.
    pub fn protected_command(
        &mut self,
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: &[u8],
    ) -> Result<Command> {
        let command = Command::new(cla, ins, p1, p2);

        let Some(session) = &mut self.session else {
            return Ok(if data.is_empty() {
                command
            } else {
                command.with_data(Bytes::copy_from_slice(data))
            });
        };

        if data.len() > PAYLOAD_MAX_SIZE {
            return Err(Error::InvalidInput("plaintext exceeds 223 bytes"));
        }

        let ciphertext = encrypt_data(data, session.keys().enc(), session.iv());

        let mut meta = ApduMeta::default();
        meta[0] = cla;
        meta[1] = ins;
        meta[2] = p1;
        meta[3] = p2;
        meta[4] = (ciphertext.len() + SC_BLOCK_SIZE) as u8;
        session.update_iv(&meta, &ciphertext);

        let mut payload = BytesMut::with_capacity(SC_BLOCK_SIZE + ciphertext.len());
        payload.put_slice(session.iv());
        payload.put_slice(&ciphertext);

        Ok(command.with_data(payload.freeze()))
    }

    /// Transmit a command and unwrap the response.
    ///
    /// A transport failure closes the session: the host IV has advanced past
    /// the card's and the chain cannot be resynchronized. Status `0x6982`
    /// also closes the session and is handed back to the caller unchanged.
    pub fn transmit(
        &mut self,
        transport: &mut dyn CardTransport,
        command: &Command,
    ) -> Result<Response> {
        let response = match transport.transmit(command) {
            Ok(response) => response,
            Err(e) => {
                self.session = None;
                return Err(e.into());
            }
        };

        if response.status() == status::SW_SECURITY_STATUS_NOT_SATISFIED {
            debug!("security status not satisfied, closing secure channel");
            self.session = None;
            return Ok(response);
        }

        let unwrapped = match &mut self.session {
            None => return Ok(response),
            Some(session) => Self::unwrap_response(session, &response),
        };

        match unwrapped {
            Ok(response) => Ok(response),
            Err(e) => {
                self.session = None;
                Err(e)
            }
        }
    }

    /// Verify, chain and decrypt a protected response.
    fn unwrap_response(session: &mut Session, response: &Response) -> Result<Response> {
        let data = response.data();
        if data.len() < SC_BLOCK_SIZE {
            return Err(Error::InvalidMac);
        }
        let (mac, ciphertext) = data.split_at(SC_BLOCK_SIZE);

        let mut meta = ApduMeta::default();
        meta[0] = data.len() as u8;

        // The IV moves to the freshly computed tag before the comparison;
        // decryption still needs the previous value.
        let decrypt_iv = *session.iv();
        session.update_iv(&meta, ciphertext);
        if session.iv().as_slice() != mac {
            return Err(Error::InvalidMac);
        }

        let plaintext = decrypt_data(ciphertext, session.keys().enc(), &decrypt_iv)?;
        if plaintext.len() < 2 {
            return Err(Error::UnexpectedResponse);
        }

        Ok(Response::from_bytes(&plaintext)?)
    }

    /// Encrypt the INIT payload with the one-shot scheme used before any
    /// session exists.
    pub fn one_shot_encrypt(&self, init_data: &[u8]) -> Result<Bytes> {
        let bootstrap = self
            .bootstrap
            .as_ref()
            .ok_or(Error::InvalidInput("no card public key ingested"))?;
        Ok(one_shot_encrypt(
            &bootstrap.host_public_key,
            &bootstrap.secret,
            init_data,
        ))
    }

    /// Mark the channel as closed.
    pub fn reset(&mut self) {
        self.session = None;
    }

    #[cfg(test)]
    pub(crate) fn install_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    #[cfg(test)]
    pub(crate) fn session_iv(&self) -> Option<Iv<WalletScp>> {
        self.session.as_ref().map(|s| *s.iv())
    }
}
