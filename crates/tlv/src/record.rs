//! TLV records and streams.
//!
//! Each record is `tag (1) || length (2, big-endian) || value (length)`. A stream is the plain
//! concatenation of records; it carries no header or count of its own.

use crate::errors::TlvError;

/// Size of a record's tag and length fields.
pub const RECORD_HEADER_LEN: usize = 3;

/// A single tag-length-value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvRecord {
    tag: u8,
    value: Vec<u8>,
}

impl TlvRecord {
    /// Creates a record, checking that the value fits the length field.
    pub fn new(tag: u8, value: impl Into<Vec<u8>>) -> Result<Self, TlvError> {
        let value = value.into();
        if value.len() > usize::from(u16::MAX) {
            return Err(TlvError::ValueTooLong {
                tag,
                len: value.len(),
            });
        }
        Ok(Self { tag, value })
    }

    /// A record holding a single byte.
    pub fn byte(tag: u8, value: u8) -> Self {
        Self {
            tag,
            value: vec![value],
        }
    }

    /// A record holding a 64-bit integer as 8 big-endian bytes.
    pub fn u64(tag: u8, value: u64) -> Self {
        Self {
            tag,
            value: value.to_be_bytes().to_vec(),
        }
    }

    /// The tag.
    pub const fn tag(&self) -> u8 {
        self.tag
    }

    /// The value.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Number of bytes this record occupies in a stream.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + self.value.len()
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        // Length is bounded by `new`.
        let len = self.value.len() as u16;
        out.push(self.tag);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.value);
    }
}

/// An ordered sequence of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvStream {
    records: Vec<TlvRecord>,
}

impl TlvStream {
    /// Creates an empty stream.
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends a record.
    pub fn push(&mut self, record: TlvRecord) {
        self.records.push(record);
    }

    /// The records in stream order.
    pub fn records(&self) -> &[TlvRecord] {
        &self.records
    }

    /// Finds the first record with `tag`.
    pub fn get(&self, tag: u8) -> Option<&TlvRecord> {
        self.records.iter().find(|record| record.tag == tag)
    }

    /// Tags in stream order.
    pub fn tags(&self) -> Vec<u8> {
        self.records.iter().map(TlvRecord::tag).collect()
    }

    /// Serialized length in bytes.
    pub fn encoded_len(&self) -> usize {
        self.records.iter().map(TlvRecord::encoded_len).sum()
    }

    /// Serializes the stream.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for record in &self.records {
            record.write_to(&mut out);
        }
        out
    }

    /// Splits a byte string into records without interpreting them.
    ///
    /// # Errors
    ///
    /// [`TlvError::Truncated`] if the bytes end inside a record.
    pub fn parse(mut bytes: &[u8]) -> Result<Self, TlvError> {
        let mut stream = Self::new();

        while !bytes.is_empty() {
            let [tag, hi, lo, rest @ ..] = bytes else {
                return Err(TlvError::Truncated {
                    needed: RECORD_HEADER_LEN,
                    available: bytes.len(),
                });
            };

            let len = usize::from(u16::from_be_bytes([*hi, *lo]));
            if rest.len() < len {
                return Err(TlvError::Truncated {
                    needed: len,
                    available: rest.len(),
                });
            }

            let (value, tail) = rest.split_at(len);
            stream.push(TlvRecord {
                tag: *tag,
                value: value.to_vec(),
            });
            bytes = tail;
        }

        Ok(stream)
    }
}

impl IntoIterator for TlvStream {
    type Item = TlvRecord;
    type IntoIter = std::vec::IntoIter<TlvRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
