//! Order-preserving key codec.
//!
//! Element bytes are escaped the way the FoundationDB tuple layer escapes byte
//! strings: every `0x00` becomes `0x00 0xFF` and the encoding ends with a bare
//! `0x00`. The result sorts exactly like the raw bytes and no encoding is a
//! prefix of another, so encoded elements can be followed by more data.
//!
//! Index records are addressed by [`NodeKey`]: either the head sentinel of a
//! level, which sorts before every element, or an element.
//!
//! Scores are `i64` stored as big-endian with the sign bit flipped, so byte
//! order matches numeric order. Counts are little-endian `i64`, the operand
//! format of the store's atomic add.

use snafu::Snafu;

/// Escape byte following an embedded `0x00`.
pub const NULL_ESCAPE: u8 = 0xFF;

/// Terminates an escaped element.
pub const TERMINATOR: u8 = 0x00;

/// Marker of a level head sentinel.
pub const HEAD_MARKER: u8 = 0x00;

/// Marker preceding an escaped element.
pub const ELEMENT_MARKER: u8 = 0x01;

/// Width of an encoded score.
pub const SCORE_WIDTH: usize = 8;

/// Width of an encoded count.
pub const COUNT_WIDTH: usize = 8;

/// Errors decoding keys and values.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum CodecError {
    #[snafu(display("unexpected end of data at offset {offset}"))]
    UnexpectedEnd { offset: usize },

    #[snafu(display("missing terminator for element starting at offset {offset}"))]
    MissingTerminator { offset: usize },

    #[snafu(display("unknown node marker {marker:#04x} at offset {offset}"))]
    UnknownMarker { marker: u8, offset: usize },

    #[snafu(display("{count} trailing bytes after offset {offset}"))]
    TrailingBytes { offset: usize, count: usize },

    #[snafu(display("invalid {what} length: expected {expected} bytes, got {actual}"))]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[snafu(display("key does not start with the expected prefix"))]
    PrefixMismatch,
}

// =============================================================================
// Elements
// =============================================================================

/// Append the escaped form of `key` without its terminator.
///
/// Any element starting with `key` encodes to bytes starting with this output.
pub fn encode_key_prefix_into(key: &[u8], buf: &mut Vec<u8>) {
    for &byte in key {
        buf.push(byte);
        if byte == 0x00 {
            buf.push(NULL_ESCAPE);
        }
    }
}

/// Append the escaped, terminated form of `key`.
pub fn encode_key_into(key: &[u8], buf: &mut Vec<u8>) {
    encode_key_prefix_into(key, buf);
    buf.push(TERMINATOR);
}

/// Encode an element. Strictly order-preserving and injective.
pub fn encode_key(key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(key.len() + 1);
    encode_key_into(key, &mut buf);
    buf
}

/// Decode an escaped element starting at `start`.
///
/// Returns the element and the number of bytes consumed, terminator included.
pub fn decode_key(data: &[u8], start: usize) -> Result<(Vec<u8>, usize), CodecError> {
    let mut result = Vec::new();
    let mut i = start;

    while i < data.len() {
        let byte = data[i];
        if byte == 0x00 {
            if i + 1 < data.len() && data[i + 1] == NULL_ESCAPE {
                result.push(0x00);
                i += 2;
            } else {
                return Ok((result, i - start + 1));
            }
        } else {
            result.push(byte);
            i += 1;
        }
    }

    Err(CodecError::MissingTerminator { offset: start })
}

/// Decode bytes that must hold exactly one escaped element.
pub fn decode_key_exact(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let (key, consumed) = decode_key(data, 0)?;
    if consumed != data.len() {
        return Err(CodecError::TrailingBytes {
            offset: consumed,
            count: data.len() - consumed,
        });
    }
    Ok(key)
}

// =============================================================================
// Index nodes
// =============================================================================

/// Start of a bucket in one level of the index.
///
/// The derived ordering matches the encoded ordering: the head sorts first,
/// elements follow in byte order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKey {
    Head,
    Element(Vec<u8>),
}

impl NodeKey {
    pub fn element(key: &[u8]) -> Self {
        NodeKey::Element(key.to_vec())
    }

    pub fn as_element(&self) -> Option<&[u8]> {
        match self {
            NodeKey::Head => None,
            NodeKey::Element(key) => Some(key),
        }
    }

    pub fn is_element(&self, key: &[u8]) -> bool {
        self.as_element() == Some(key)
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            NodeKey::Head => buf.push(HEAD_MARKER),
            NodeKey::Element(key) => encode_element_node_into(key, buf),
        }
    }

    /// Decode a node that occupies all of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        match data.first() {
            None => Err(CodecError::UnexpectedEnd { offset: 0 }),
            Some(&HEAD_MARKER) if data.len() == 1 => Ok(NodeKey::Head),
            Some(&HEAD_MARKER) => Err(CodecError::TrailingBytes {
                offset: 1,
                count: data.len() - 1,
            }),
            Some(&ELEMENT_MARKER) => decode_key_exact(&data[1..]).map(NodeKey::Element).map_err(|err| shift(err, 1)),
            Some(&marker) => Err(CodecError::UnknownMarker { marker, offset: 0 }),
        }
    }
}

/// Append an element node without materializing a [`NodeKey`].
pub fn encode_element_node_into(key: &[u8], buf: &mut Vec<u8>) {
    buf.push(ELEMENT_MARKER);
    encode_key_into(key, buf);
}

fn shift(err: CodecError, by: usize) -> CodecError {
    match err {
        CodecError::UnexpectedEnd { offset } => CodecError::UnexpectedEnd { offset: offset + by },
        CodecError::MissingTerminator { offset } => CodecError::MissingTerminator { offset: offset + by },
        CodecError::UnknownMarker { marker, offset } => CodecError::UnknownMarker {
            marker,
            offset: offset + by,
        },
        CodecError::TrailingBytes { offset, count } => CodecError::TrailingBytes {
            offset: offset + by,
            count,
        },
        other => other,
    }
}

// =============================================================================
// Scores and counts
// =============================================================================

/// Encode a score so that byte order equals numeric order.
#[inline]
pub fn encode_score(score: i64) -> [u8; SCORE_WIDTH] {
    ((score as u64) ^ (1 << 63)).to_be_bytes()
}

pub fn decode_score(bytes: &[u8]) -> Result<i64, CodecError> {
    let word: [u8; SCORE_WIDTH] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
        what: "score",
        expected: SCORE_WIDTH,
        actual: bytes.len(),
    })?;
    Ok((u64::from_be_bytes(word) ^ (1 << 63)) as i64)
}

/// Pack a score and key so elements sort by score, then by key.
pub fn encode_scored(key: &[u8], score: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SCORE_WIDTH + key.len());
    buf.extend_from_slice(&encode_score(score));
    buf.extend_from_slice(key);
    buf
}

/// Split a packed element into `(key, score)`.
pub fn decode_scored(element: &[u8]) -> Result<(Vec<u8>, i64), CodecError> {
    if element.len() < SCORE_WIDTH {
        return Err(CodecError::InvalidLength {
            what: "scored element",
            expected: SCORE_WIDTH,
            actual: element.len(),
        });
    }
    let (score, key) = element.split_at(SCORE_WIDTH);
    Ok((key.to_vec(), decode_score(score)?))
}

#[inline]
pub fn encode_count(count: i64) -> [u8; COUNT_WIDTH] {
    count.to_le_bytes()
}

pub fn decode_count(bytes: &[u8]) -> Result<i64, CodecError> {
    let word: [u8; COUNT_WIDTH] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
        what: "count",
        expected: COUNT_WIDTH,
        actual: bytes.len(),
    })?;
    Ok(i64::from_le_bytes(word))
}
