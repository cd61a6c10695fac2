//! The applet command set.
//!
//! [`CommandSet`] formats one APDU per applet command and pushes it through
//! the secure channel. It never interprets application-level status words:
//! a wrong PIN or a missing key comes back to the caller as the status word
//! of the returned [`Response`].

use iso7816_tlv::ber::{Tag, Tlv, Value};
use tracing::debug;
use zeroize::Zeroizing;

use walletlite_apdu_core::{CardTransport, Command, Response};

use crate::constants::{
    tags, APPLET_AID, CLA_GP, CLA_ISO7816, EXPORT_KEY_P2_PRIVATE_AND_PUBLIC,
    EXPORT_KEY_P2_PUBLIC_ONLY, GET_STATUS_P1_APPLICATION, INS_CHANGE_PIN, INS_DERIVE_KEY,
    INS_EXPORT_KEY, INS_GENERATE_KEY, INS_GENERATE_MNEMONIC, INS_GET_STATUS, INS_INIT,
    INS_LOAD_KEY, INS_REMOVE_KEY, INS_SELECT, INS_SET_NDEF, INS_SET_PINLESS_PATH, INS_SIGN,
    INS_UNBLOCK_PIN, INS_VERIFY_PIN, LOAD_KEY_P1_EC, LOAD_KEY_P1_EXT_EC, LOAD_KEY_P1_SEED,
};
use crate::crypto::generate_pairing_token;
use crate::error::{Error, Result};
use crate::secrets::Secrets;
use crate::secure_channel::SecureChannelSession;
use crate::types::{KeyPath, PairingInfo};

/// Where DERIVE KEY starts the derivation from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeriveSource {
    /// Derive from the master key.
    #[default]
    Master,
    /// Derive from the parent of the current key.
    Parent,
    /// Derive from the current key.
    Current,
}

impl DeriveSource {
    const fn p1(self) -> u8 {
        match self {
            Self::Master => crate::constants::DERIVE_P1_SOURCE_MASTER,
            Self::Parent => crate::constants::DERIVE_P1_SOURCE_PARENT,
            Self::Current => crate::constants::DERIVE_P1_SOURCE_CURRENT,
        }
    }
}

/// Sends applet commands over a transport, tunneling them through one
/// [`SecureChannelSession`].
pub struct CommandSet<T: CardTransport> {
    transport: T,
    secure_channel: SecureChannelSession,
}

impl<T: CardTransport> CommandSet<T> {
    /// Create a command set over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            secure_channel: SecureChannelSession::new(),
        }
    }

    /// Create a command set reusing a persisted pairing.
    pub fn with_pairing_info(transport: T, pairing: PairingInfo) -> Self {
        Self {
            transport,
            secure_channel: SecureChannelSession::with_pairing_info(pairing),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The secure channel session.
    pub fn secure_channel(&self) -> &SecureChannelSession {
        &self.secure_channel
    }

    /// The active pairing, if any. Persist this between sessions.
    pub fn pairing_info(&self) -> Option<&PairingInfo> {
        self.secure_channel.pairing_info()
    }

    /// Install a pairing restored from persistent storage.
    pub fn set_pairing_info(&mut self, pairing: PairingInfo) {
        self.secure_channel.set_pairing_info(pairing);
    }

    /// Wrap and transmit one applet command.
    fn send(&mut self, cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Result<Response> {
        let command = self.secure_channel.protected_command(cla, ins, p1, p2, data)?;
        self.secure_channel.transmit(&mut self.transport, &command)
    }

    /// Select the applet and feed its public key into the secure channel.
    ///
    /// The response carries either an application-info template (tag `0xA4`,
    /// public key at a fixed offset) or a bare public-key TLV (tag `0x80`,
    /// cards still waiting for INIT).
    pub fn select(&mut self) -> Result<Response> {
        let command =
            Command::new(CLA_ISO7816, INS_SELECT, 0x04, 0x00).with_data(APPLET_AID.to_vec());
        let response = self.transport.transmit(&command)?;

        if response.status().is_success() {
            let key_data = extract_public_key_from_select(response.data())?;
            self.secure_channel.ingest_card_public_key(key_data)?;
            debug!(card_public_key = %hex::encode(key_data), "applet selected");
        }

        Ok(response)
    }

    /// Pair using a pairing password, deriving the shared secret with PBKDF2.
    pub fn auto_pair(&mut self, pairing_password: &str) -> Result<()> {
        let token = Zeroizing::new(generate_pairing_token(pairing_password));
        self.auto_pair_with_secret(&token)
    }

    /// Pair using a raw 32-byte shared pairing secret.
    pub fn auto_pair_with_secret(&mut self, shared_secret: &[u8; 32]) -> Result<()> {
        self.secure_channel.auto_pair(&mut self.transport, shared_secret)
    }

    /// Open the secure channel over the active pairing.
    pub fn auto_open_secure_channel(&mut self) -> Result<()> {
        self.secure_channel.auto_open_secure_channel(&mut self.transport)
    }

    /// Release this client's pairing slot.
    pub fn auto_unpair(&mut self) -> Result<()> {
        self.secure_channel.auto_unpair(&mut self.transport)
    }

    /// Release every pairing slot except this client's.
    pub fn unpair_others(&mut self) -> Result<()> {
        self.secure_channel.unpair_others(&mut self.transport)
    }

    /// VERIFY PIN. A wrong PIN is not an error: the card answers `0x63Cx`
    /// with the remaining attempts.
    pub fn verify_pin(&mut self, pin: &str) -> Result<Response> {
        self.send(CLA_GP, INS_VERIFY_PIN, 0, 0, pin.as_bytes())
    }

    /// CHANGE PIN for the given PIN type.
    pub fn change_pin(&mut self, pin_type: u8, pin: &[u8]) -> Result<Response> {
        if pin_type > 0x03 {
            return Err(Error::InvalidInput("PIN type out of range"));
        }
        self.send(CLA_GP, INS_CHANGE_PIN, pin_type, 0, pin)
    }

    /// UNBLOCK PIN with the PUK, setting a new PIN.
    pub fn unblock_pin(&mut self, puk: &str, new_pin: &str) -> Result<Response> {
        let mut data = Zeroizing::new(Vec::with_capacity(puk.len() + new_pin.len()));
        data.extend_from_slice(puk.as_bytes());
        data.extend_from_slice(new_pin.as_bytes());
        self.send(CLA_GP, INS_UNBLOCK_PIN, 0, 0, &data)
    }

    /// LOAD KEY with raw data and an explicit key type in P1.
    pub fn load_key(&mut self, data: &[u8], p1: u8) -> Result<Response> {
        self.send(CLA_GP, INS_LOAD_KEY, p1, 0, data)
    }

    /// LOAD KEY in seed form: private scalar and chain code, as produced by
    /// BIP32 master key generation. The loaded key supports derivation.
    pub fn load_key_seed(&mut self, private_key: &[u8], chain_code: &[u8; 32]) -> Result<Response> {
        let private_key = strip_leading_zero(private_key)?;

        let mut data = Zeroizing::new(Vec::with_capacity(private_key.len() + chain_code.len()));
        data.extend_from_slice(private_key);
        data.extend_from_slice(chain_code);
        self.load_key(&data, LOAD_KEY_P1_SEED)
    }

    /// LOAD KEY in TLV form.
    ///
    /// The public key may be omitted; the chain code decides between the
    /// plain EC (P1 `0x01`) and extended EC (P1 `0x02`) key types.
    pub fn load_key_keypair(
        &mut self,
        public_key: Option<&[u8]>,
        private_key: &[u8],
        chain_code: Option<&[u8; 32]>,
    ) -> Result<Response> {
        let mut fields = Vec::new();
        if let Some(public_key) = public_key {
            fields.push(primitive_tlv(tags::PUB_KEY, public_key)?);
        }
        fields.push(primitive_tlv(tags::PRIV_KEY, strip_leading_zero(private_key)?)?);

        let p1 = match chain_code {
            Some(chain_code) => {
                fields.push(primitive_tlv(tags::CHAIN_CODE, chain_code)?);
                LOAD_KEY_P1_EXT_EC
            }
            None => LOAD_KEY_P1_EC,
        };

        let template = Tlv::new(
            Tag::try_from(tags::KEYPAIR_TEMPLATE)
                .map_err(|_| Error::InvalidInput("invalid key template tag"))?,
            Value::Constructed(fields),
        )
        .map_err(|_| Error::InvalidInput("invalid key material TLV"))?;

        let data = Zeroizing::new(template.to_vec());
        self.load_key(&data, p1)
    }

    /// GENERATE MNEMONIC with the given checksum length in P1.
    pub fn generate_mnemonic(&mut self, checksum_length: u8) -> Result<Response> {
        self.send(CLA_GP, INS_GENERATE_MNEMONIC, checksum_length, 0, &[])
    }

    /// REMOVE KEY.
    pub fn remove_key(&mut self) -> Result<Response> {
        self.send(CLA_GP, INS_REMOVE_KEY, 0, 0, &[])
    }

    /// GENERATE KEY on the card.
    pub fn generate_key(&mut self) -> Result<Response> {
        self.send(CLA_GP, INS_GENERATE_KEY, 0, 0, &[])
    }

    /// SIGN a precomputed 32-byte hash.
    pub fn sign(&mut self, hash: &[u8]) -> Result<Response> {
        if hash.len() != 32 {
            return Err(Error::InvalidInput("signature input must be a 32-byte hash"));
        }
        self.send(CLA_GP, INS_SIGN, 0, 0, hash)
    }

    /// DERIVE KEY starting from the master key.
    pub fn derive_key(&mut self, path: &KeyPath) -> Result<Response> {
        self.derive_key_from_source(path, DeriveSource::Master)
    }

    /// DERIVE KEY starting from the given source.
    pub fn derive_key_from_source(
        &mut self,
        path: &KeyPath,
        source: DeriveSource,
    ) -> Result<Response> {
        self.send(CLA_GP, INS_DERIVE_KEY, source.p1(), 0, &path.to_bytes())
    }

    /// SET PINLESS PATH. An empty path disables PIN-less signing.
    pub fn set_pinless_path(&mut self, path: &KeyPath) -> Result<Response> {
        self.send(CLA_GP, INS_SET_PINLESS_PATH, 0, 0, &path.to_bytes())
    }

    /// EXPORT KEY at the given key path index.
    pub fn export_key(&mut self, key_path_index: u8, public_only: bool) -> Result<Response> {
        let p2 = if public_only {
            EXPORT_KEY_P2_PUBLIC_ONLY
        } else {
            EXPORT_KEY_P2_PRIVATE_AND_PUBLIC
        };
        self.send(CLA_GP, INS_EXPORT_KEY, key_path_index, p2, &[])
    }

    /// GET STATUS with the given info byte in P1.
    pub fn get_status(&mut self, info: u8) -> Result<Response> {
        self.send(CLA_GP, INS_GET_STATUS, info, 0, &[])
    }

    /// Whether the card has a master key loaded, read from the application
    /// status template.
    pub fn get_key_initialization_status(&mut self) -> Result<bool> {
        let response = self.get_status(GET_STATUS_P1_APPLICATION)?;
        match response.data().last() {
            Some(&byte) => Ok(byte != 0x00),
            None => Err(Error::UnexpectedResponse),
        }
    }

    /// SET NDEF content for NFC tag emulation.
    pub fn set_ndef(&mut self, ndef: &[u8]) -> Result<Response> {
        self.send(CLA_GP, INS_SET_NDEF, 0, 0, ndef)
    }

    /// INIT a virgin applet with PIN, PUK and the pairing secret, encrypted
    /// with the one-shot scheme. Requires a prior [`select`](Self::select).
    pub fn init(&mut self, pin: &str, puk: &str, shared_secret: &[u8; 32]) -> Result<Response> {
        let mut init_data =
            Zeroizing::new(Vec::with_capacity(pin.len() + puk.len() + shared_secret.len()));
        init_data.extend_from_slice(pin.as_bytes());
        init_data.extend_from_slice(puk.as_bytes());
        init_data.extend_from_slice(shared_secret);

        let payload = self.secure_channel.one_shot_encrypt(&init_data)?;
        let command = Command::new(CLA_GP, INS_INIT, 0, 0).with_data(payload);
        Ok(self.transport.transmit(&command)?)
    }

    /// INIT with a [`Secrets`] bundle.
    pub fn init_with_secrets(&mut self, secrets: &Secrets) -> Result<Response> {
        self.init(secrets.pin(), secrets.puk(), secrets.pairing_token())
    }
}

/// Build a primitive BER-TLV field for the LOAD KEY template.
fn primitive_tlv(tag: u8, value: &[u8]) -> Result<Tlv> {
    let tag = Tag::try_from(tag).map_err(|_| Error::InvalidInput("invalid key material tag"))?;
    Tlv::new(tag, Value::Primitive(value.to_vec()))
        .map_err(|_| Error::InvalidInput("invalid key material TLV"))
}

/// Locate the card public key in a SELECT response.
fn extract_public_key_from_select(data: &[u8]) -> Result<&[u8]> {
    match data.first() {
        Some(&tags::APPLICATION_INFO_TEMPLATE) => {
            let length = *data.get(21).ok_or(Error::UnexpectedResponse)? as usize;
            data.get(22..22 + length).ok_or(Error::UnexpectedResponse)
        }
        Some(&tags::PUB_KEY) if data.len() >= 2 => Ok(&data[2..]),
        _ => Err(Error::UnexpectedResponse),
    }
}

/// Drop the sign byte some encoders prepend to a positive scalar.
fn strip_leading_zero(private_key: &[u8]) -> Result<&[u8]> {
    let stripped = match private_key.first() {
        Some(0x00) => &private_key[1..],
        Some(_) => private_key,
        None => return Err(Error::InvalidInput("empty private key")),
    };
    if stripped.is_empty() {
        return Err(Error::InvalidInput("empty private key"));
    }
    Ok(stripped)
}
