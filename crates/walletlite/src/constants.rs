//! Protocol constants for the wallet applet.

/// AID of the wallet applet, ASCII `StatusWalletApp`.
pub const APPLET_AID: [u8; 15] = [
    0x53, 0x74, 0x61, 0x74, 0x75, 0x73, 0x57, 0x61, 0x6C, 0x6C, 0x65, 0x74, 0x41, 0x70, 0x70,
];

/// Class byte for all applet commands except SELECT.
pub const CLA_GP: u8 = 0x80;
/// Class byte for SELECT.
pub const CLA_ISO7816: u8 = 0x00;

pub const INS_SELECT: u8 = 0xA4;
pub const INS_OPEN_SECURE_CHANNEL: u8 = 0x10;
pub const INS_MUTUALLY_AUTHENTICATE: u8 = 0x11;
pub const INS_PAIR: u8 = 0x12;
pub const INS_UNPAIR: u8 = 0x13;
pub const INS_VERIFY_PIN: u8 = 0x20;
pub const INS_CHANGE_PIN: u8 = 0x21;
pub const INS_UNBLOCK_PIN: u8 = 0x22;
pub const INS_SIGN: u8 = 0xC0;
pub const INS_SET_PINLESS_PATH: u8 = 0xC1;
pub const INS_EXPORT_KEY: u8 = 0xC2;
pub const INS_LOAD_KEY: u8 = 0xD0;
pub const INS_DERIVE_KEY: u8 = 0xD1;
pub const INS_GENERATE_MNEMONIC: u8 = 0xD2;
pub const INS_REMOVE_KEY: u8 = 0xD3;
pub const INS_GENERATE_KEY: u8 = 0xD4;
/// GET STATUS and SET NDEF share the instruction byte; the applet
/// disambiguates by P1 and data.
pub const INS_GET_STATUS: u8 = 0xF2;
pub const INS_SET_NDEF: u8 = 0xF2;
pub const INS_INIT: u8 = 0xFE;

pub const PAIR_P1_FIRST_STEP: u8 = 0x00;
pub const PAIR_P1_LAST_STEP: u8 = 0x01;

pub const GET_STATUS_P1_APPLICATION: u8 = 0x00;

pub const LOAD_KEY_P1_EC: u8 = 0x01;
pub const LOAD_KEY_P1_EXT_EC: u8 = 0x02;
pub const LOAD_KEY_P1_SEED: u8 = 0x03;

pub const DERIVE_P1_SOURCE_MASTER: u8 = 0x00;
pub const DERIVE_P1_SOURCE_PARENT: u8 = 0x40;
pub const DERIVE_P1_SOURCE_CURRENT: u8 = 0x80;

pub const EXPORT_KEY_P2_PRIVATE_AND_PUBLIC: u8 = 0x00;
pub const EXPORT_KEY_P2_PUBLIC_ONLY: u8 = 0x01;

/// Key material TLV tags used by LOAD KEY.
pub mod tags {
    pub const PUB_KEY: u8 = 0x80;
    pub const PRIV_KEY: u8 = 0x81;
    pub const CHAIN_CODE: u8 = 0x82;
    pub const KEYPAIR_TEMPLATE: u8 = 0xA1;
    pub const APPLICATION_INFO_TEMPLATE: u8 = 0xA4;
}

/// Length of the ECDH secret, session keys and pairing challenges.
pub const SC_SECRET_LENGTH: usize = 32;
/// AES block size, which is also the MAC and IV length.
pub const SC_BLOCK_SIZE: usize = 16;
/// Maximum plaintext that fits in a single wrapped APDU.
pub const PAYLOAD_MAX_SIZE: usize = 223;
/// The card holds at most this many concurrent pairings.
pub const PAIRING_MAX_CLIENT_COUNT: u8 = 5;

/// PBKDF2 salt for deriving the pairing token from a password.
pub const PAIRING_TOKEN_SALT: &str = "Status Hardware Wallet Lite";
/// PBKDF2 iteration count for the pairing token.
pub const PAIRING_TOKEN_ITERATIONS: u32 = 50_000;

/// Uncompressed secp256k1 point length (`0x04 ‖ X ‖ Y`).
pub const UNCOMPRESSED_POINT_LENGTH: usize = 65;
