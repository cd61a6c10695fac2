use std::fmt;
use std::str::FromStr;

use crate::error::Error;

const HARDENED: u32 = 0x8000_0000;

/// A BIP32 derivation path in the applet's wire format.
///
/// The applet takes key paths as a plain concatenation of 32-bit big-endian
/// path components, hardened components having the top bit set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyPath(Vec<u32>);

impl KeyPath {
    /// Build a path from raw components (hardened bit included).
    pub fn new(components: Vec<u32>) -> Self {
        Self(components)
    }

    /// The raw path components.
    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Encode the path for DERIVE KEY / SET PINLESS PATH.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for component in &self.0 {
            out.extend_from_slice(&component.to_be_bytes());
        }
        out
    }
}

impl FromStr for KeyPath {
    type Err = Error;

    /// Parse `m/44'/60'/0'/0/0` style notation. The leading `m/` is
    /// optional; `'` or `h` marks a hardened component.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s.strip_prefix("m/").or_else(|| s.strip_prefix("M/")).unwrap_or(s);

        if path.is_empty() || path == "m" || path == "M" {
            return Ok(Self::default());
        }

        let mut components = Vec::new();
        for part in path.split('/') {
            let (digits, hardened) = match part.strip_suffix(['\'', 'h', 'H']) {
                Some(digits) => (digits, true),
                None => (part, false),
            };

            let index: u32 = digits
                .parse()
                .map_err(|_| Error::InvalidInput("invalid path component"))?;
            if index >= HARDENED {
                return Err(Error::InvalidInput("path component out of range"));
            }

            components.push(if hardened { index | HARDENED } else { index });
        }

        Ok(Self(components))
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for component in &self.0 {
            if component & HARDENED != 0 {
                write!(f, "/{}'", component & !HARDENED)?;
            } else {
                write!(f, "/{}", component)?;
            }
        }
        Ok(())
    }
}
