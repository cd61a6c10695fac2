//! Cryptographic primitives for pairing and the secure channel.
//!
//! Everything the channel needs is funneled through this module: ECDH key
//! agreement, session key derivation, the CBC cipher with ISO 7816-4 padding,
//! and the CMAC used both as response MAC and as the next chaining IV.

use aes::{Aes128, Aes256};
use bytes::{BufMut, Bytes, BytesMut};
use cbc::{Decryptor, Encryptor};
use cipher::{
    block_padding::Iso7816,
    typenum::{U16, U32},
    BlockDecryptMut, BlockEncryptMut, Iv, IvSizeUser, Key, KeyIvInit, KeySizeUser,
};
use cmac::{Cmac, Mac};
use k256::elliptic_curve::ecdh;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

use crate::constants::{PAIRING_TOKEN_ITERATIONS, PAIRING_TOKEN_SALT, SC_BLOCK_SIZE};
use crate::error::Error;

/// Cipher parameters of the wallet secure channel protocol.
///
/// Session keys are 32 bytes (AES-256 for the CBC cipher) and the IV is one
/// AES block.
#[derive(Debug, Clone, Copy)]
pub struct WalletScp;

impl KeySizeUser for WalletScp {
    type KeySize = U32;
}

impl IvSizeUser for WalletScp {
    type IvSize = U16;
}

/// A random 32-byte challenge exchanged during pairing and authentication.
pub type Challenge = [u8; 32];
/// A 32-byte SHA-256 pairing cryptogram.
pub type Cryptogram = [u8; 32];
/// The 32-byte pairing token derived from the pairing password.
pub type PairingToken = [u8; 32];
/// The 16-byte metadata block mixed into every APDU MAC.
pub type ApduMeta = [u8; SC_BLOCK_SIZE];

/// Derive the pairing token from a pairing password.
///
/// PBKDF2-HMAC-SHA-256 with a fixed salt and iteration count; these
/// parameters must not change or pairing with existing cards breaks.
pub fn generate_pairing_token(password: &str) -> PairingToken {
    let mut token = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        PAIRING_TOKEN_SALT.as_bytes(),
        PAIRING_TOKEN_ITERATIONS,
        &mut token,
    );
    token
}

/// ECDH over secp256k1, returning the X coordinate of the shared point.
pub fn generate_ecdh_shared_secret(
    private_key: &SecretKey,
    public_key: &PublicKey,
) -> Zeroizing<[u8; 32]> {
    let shared = ecdh::diffie_hellman(private_key.to_nonzero_scalar(), public_key.as_affine());
    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(shared.raw_secret_bytes());
    secret
}

/// Derive the session keys from the ECDH secret, the pairing key and the
/// salt returned by OPEN SECURE CHANNEL.
///
/// `SHA-512(secret ‖ pairing_key ‖ salt)`, first half encryption key, second
/// half MAC key.
pub fn derive_session_keys(
    secret: &[u8; 32],
    pairing_key: &[u8; 32],
    salt: &[u8],
) -> (Key<WalletScp>, Key<WalletScp>) {
    let mut hasher = Sha512::new();
    hasher.update(secret);
    hasher.update(pairing_key);
    hasher.update(salt);
    let digest = hasher.finalize();

    let enc = Key::<WalletScp>::clone_from_slice(&digest[..32]);
    let mac = Key::<WalletScp>::clone_from_slice(&digest[32..]);
    (enc, mac)
}

/// The pairing cryptogram `SHA-256(shared_secret ‖ data)`.
pub fn calculate_cryptogram(shared_secret: &[u8; 32], data: &[u8]) -> Cryptogram {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.update(data);
    hasher.finalize().into()
}

/// AES-256-CBC encryption with ISO 7816-4 padding.
pub fn encrypt_data(data: &[u8], key: &Key<WalletScp>, iv: &Iv<WalletScp>) -> Vec<u8> {
    Encryptor::<Aes256>::new(key, iv).encrypt_padded_vec_mut::<Iso7816>(data)
}

/// AES-256-CBC decryption with ISO 7816-4 padding.
pub fn decrypt_data(
    data: &[u8],
    key: &Key<WalletScp>,
    iv: &Iv<WalletScp>,
) -> Result<Vec<u8>, Error> {
    Decryptor::<Aes256>::new(key, iv)
        .decrypt_padded_vec_mut::<Iso7816>(data)
        .map_err(|_| Error::Crypto("invalid ISO 7816-4 padding"))
}

/// CMAC over `meta ‖ data`, keyed with the first half of the session MAC key.
///
/// The 16-byte tag authenticates the exchange and becomes the next CBC IV.
pub fn calculate_mac(meta: &ApduMeta, data: &[u8], mac_key: &Key<WalletScp>) -> Iv<WalletScp> {
    let key = Key::<Cmac<Aes128>>::from_slice(&mac_key[..SC_BLOCK_SIZE]);
    let mut mac = Cmac::<Aes128>::new(key);
    mac.update(meta);
    mac.update(data);
    mac.finalize().into_bytes()
}

/// Encrypt the INIT payload before any session exists.
///
/// The data is encrypted under the raw ECDH secret with a random IV and
/// framed as `len(pub) ‖ pub ‖ iv ‖ ciphertext` so the card can run the same
/// key agreement from the embedded ephemeral public key.
pub fn one_shot_encrypt(host_public_key: &PublicKey, secret: &[u8; 32], data: &[u8]) -> Bytes {
    let mut iv = Iv::<WalletScp>::default();
    rand::rng().fill_bytes(&mut iv);

    let key = Key::<WalletScp>::clone_from_slice(secret);
    let ciphertext = encrypt_data(data, &key, &iv);

    let point = host_public_key.to_encoded_point(false);
    let public_bytes = point.as_bytes();

    let mut payload =
        BytesMut::with_capacity(1 + public_bytes.len() + iv.len() + ciphertext.len());
    payload.put_u8(public_bytes.len() as u8);
    payload.put_slice(public_bytes);
    payload.put_slice(&iv);
    payload.put_slice(&ciphertext);
    payload.freeze()
}
