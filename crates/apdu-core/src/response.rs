//! APDU response representation.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::status::StatusWord;

/// An ISO 7816-4 response APDU: `DATA SW1 SW2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    data: Bytes,
    status: StatusWord,
}

impl Response {
    /// Create a response from its payload and status word.
    pub fn new(data: impl Into<Bytes>, status: StatusWord) -> Self {
        Self {
            data: data.into(),
            status,
        }
    }

    /// Parse a raw response. The last two bytes are the status word.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 2 {
            return Err(Error::Parse("response shorter than a status word"));
        }

        let (data, sw) = bytes.split_at(bytes.len() - 2);
        Ok(Self {
            data: Bytes::copy_from_slice(data),
            status: StatusWord::new(sw[0], sw[1]),
        })
    }

    /// The response payload, possibly empty.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The status word.
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Serialize back to wire format.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() + 2);
        buf.put_slice(&self.data);
        buf.put_u8(self.status.sw1);
        buf.put_u8(self.status.sw2);
        buf.freeze()
    }

    /// Return the response if its status is `0x9000`, error otherwise.
    ///
    /// This is a caller convenience: the client itself always surfaces the
    /// raw status word.
    pub fn require_success(self) -> Result<Self, Error> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(Error::Status(self.status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_from_bytes() {
        let response = Response::from_bytes(&hex!("0102039000")).unwrap();
        assert_eq!(response.data().as_ref(), hex!("010203"));
        assert!(response.status().is_success());
    }

    #[test]
    fn test_from_bytes_status_only() {
        let response = Response::from_bytes(&hex!("63C2")).unwrap();
        assert!(response.data().is_empty());
        assert_eq!(response.status().remaining_attempts(), Some(2));
    }

    #[test]
    fn test_from_bytes_too_short() {
        assert!(Response::from_bytes(&[0x90]).is_err());
        assert!(Response::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_round_trip() {
        let raw = hex!("A501FF9000");
        let response = Response::from_bytes(&raw).unwrap();
        assert_eq!(response.to_bytes().as_ref(), raw);
    }

    #[test]
    fn test_require_success() {
        let ok = Response::from_bytes(&hex!("9000")).unwrap();
        assert!(ok.require_success().is_ok());

        let err = Response::from_bytes(&hex!("6A80")).unwrap();
        assert!(matches!(err.require_success(), Err(Error::Status(_))));
    }
}
