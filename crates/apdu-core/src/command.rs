//! APDU command representation.

use bytes::{BufMut, Bytes, BytesMut};

/// An ISO 7816-4 short command APDU: `CLA INS P1 P2 [Lc DATA]`.
///
/// The applet protocol never uses the Le field, so none is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Option<Bytes>,
}

impl Command {
    /// Create a new command with no data field.
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
        }
    }

    /// Attach a data field to the command.
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Get the class byte.
    pub const fn class(&self) -> u8 {
        self.cla
    }

    /// Get the instruction byte.
    pub const fn instruction(&self) -> u8 {
        self.ins
    }

    /// Get the P1 parameter.
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Get the P2 parameter.
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Get the data field, if any.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Serialize the command to wire format.
    ///
    /// An empty data field is treated like an absent one: no Lc is emitted.
    pub fn to_bytes(&self) -> Bytes {
        let data_len = self.data.as_ref().map_or(0, |d| d.len());
        debug_assert!(data_len <= 255, "short APDU data field exceeds 255 bytes");

        let mut buf = BytesMut::with_capacity(5 + data_len);
        buf.put_u8(self.cla);
        buf.put_u8(self.ins);
        buf.put_u8(self.p1);
        buf.put_u8(self.p2);

        if let Some(data) = &self.data {
            if !data.is_empty() {
                buf.put_u8(data.len() as u8);
                buf.put_slice(data);
            }
        }

        buf.freeze()
    }
}
