pub mod key_path;
pub mod pairing_info;

pub use key_path::KeyPath;
pub use pairing_info::PairingInfo;
