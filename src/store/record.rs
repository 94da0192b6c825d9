//! Record framing for the append log
//!
//! ```text
//! [kind: 1 byte][len: u32 LE][checksum: 32 bytes][payload: len bytes, zstd]
//! ```
//!
//! The checksum is BLAKE3 over the kind byte and the uncompressed payload.

use crate::model::Hash;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Size of the fixed frame header
pub(crate) const FRAME_HEADER_SIZE: usize = 1 + 4 + 32;

/// Type tag for records
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RecordKind {
    /// A serialized tree node
    Node,
    /// Marks everything since the previous commit as durable
    Commit,
}

impl RecordKind {
    pub(crate) fn as_byte(&self) -> u8 {
        match self {
            RecordKind::Node => 0,
            RecordKind::Commit => 1,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RecordKind::Node),
            1 => Some(RecordKind::Commit),
            _ => None,
        }
    }
}

/// Payload of a commit record
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct CommitRecord {
    /// Root after this commit
    pub root: Hash,
    /// Nodes removed by this commit
    pub deleted: Vec<Hash>,
}

/// A typed chunk of log data
#[derive(Clone, Debug)]
pub(crate) struct Record {
    pub kind: RecordKind,
    /// Raw data (uncompressed)
    pub data: Vec<u8>,
}

/// Result of reading one frame
#[derive(Debug)]
pub(crate) enum Frame {
    /// An intact record and its frame length
    Record(Record, u64),
    /// Clean end of input
    End,
    /// The frame runs past the end of input
    Short,
}

impl Record {
    pub(crate) fn new(kind: RecordKind, data: Vec<u8>) -> Self {
        Record { kind, data }
    }

    fn checksum(kind: RecordKind, data: &[u8]) -> Hash {
        Hash::digest_many(&[&[kind.as_byte()], data])
    }

    /// Frame the record for appending to the log
    pub(crate) fn encode(&self, level: i32) -> Result<Vec<u8>> {
        let compressed = zstd::encode_all(self.data.as_slice(), level)?;
        let len = u32::try_from(compressed.len())
            .map_err(|_| Error::Corruption("Record larger than 4 GiB".into()))?;

        let mut output = Vec::with_capacity(FRAME_HEADER_SIZE + compressed.len());
        output.push(self.kind.as_byte());
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(Self::checksum(self.kind, &self.data).as_bytes());
        output.extend(compressed);
        Ok(output)
    }

    /// Read one framed record from input holding `remaining` more bytes.
    ///
    /// A frame whose header or payload would run past `remaining` is
    /// [`Frame::Short`] and nothing is allocated for it. An unknown kind, an
    /// undecodable payload or a checksum mismatch is [`Error::Corruption`].
    pub(crate) fn read_from(reader: &mut impl Read, remaining: u64) -> Result<Frame> {
        if remaining == 0 {
            return Ok(Frame::End);
        }
        if remaining < FRAME_HEADER_SIZE as u64 {
            return Ok(Frame::Short);
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        read_or_short(reader, &mut header)?;

        let kind = RecordKind::from_byte(header[0])
            .ok_or_else(|| Error::Corruption(format!("Invalid record kind: {}", header[0])))?;
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[1..5]);
        let len = u32::from_le_bytes(len_bytes);
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&header[5..FRAME_HEADER_SIZE]);

        let frame_len = FRAME_HEADER_SIZE as u64 + u64::from(len);
        if frame_len > remaining {
            return Ok(Frame::Short);
        }

        let mut compressed = vec![0u8; len as usize];
        if !read_or_short(reader, &mut compressed)? {
            return Ok(Frame::Short);
        }

        let data = zstd::decode_all(compressed.as_slice())
            .map_err(|e| Error::Corruption(format!("Undecodable record payload: {}", e)))?;
        if Self::checksum(kind, &data) != Hash::from_bytes(checksum) {
            return Err(Error::Corruption("Record checksum mismatch".into()));
        }

        Ok(Frame::Record(Record { kind, data }, frame_len))
    }
}

/// Fill `buf`, returning `false` if input ends first
fn read_or_short(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(Error::Io(e)),
    }
}
