//! RESP value model shared by the parser and the dispatch surface.
//!
//! A parsed frame is represented as a [`RespValue`] plus the exact bytes it
//! occupied on the wire ([`Frame`]). Length-prefixed kinds (`$`, `!`, `=`)
//! keep their payload bytes verbatim and are never text-decoded; delimited
//! textual kinds (`+`, `-`) are decoded to UTF-8 at parse time.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Wire prefix bytes of the fourteen RESP type tags.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum Tag {
    SimpleString = b'+',
    Error = b'-',
    Integer = b':',
    BulkString = b'$',
    Array = b'*',
    Double = b',',
    Boolean = b'#',
    BigNumber = b'(',
    BlobError = b'!',
    VerbatimString = b'=',
    Map = b'%',
    Set = b'~',
    Attribute = b'|',
    Push = b'>',
}

impl Tag {
    /// Maps a wire prefix byte to its tag, or `None` for an unknown byte.
    pub fn from_byte(byte: u8) -> Option<Tag> {
        FromPrimitive::from_u8(byte)
    }

    /// Whether this tag exists only in the RESP3 dialect.
    pub fn is_resp3(self) -> bool {
        matches!(
            self,
            Tag::Double
                | Tag::Boolean
                | Tag::BigNumber
                | Tag::BlobError
                | Tag::VerbatimString
                | Tag::Map
                | Tag::Set
                | Tag::Attribute
                | Tag::Push
        )
    }
}

/// Protocol dialect negotiated on a connection.
///
/// Every connection starts as [`Dialect::Resp2`] and is upgraded once a
/// frame carrying an RESP3-only value arrives. The upgrade is informational;
/// the parser accepts the full grammar regardless.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    Resp2,
    Resp3,
}

/// A single parsed RESP value.
///
/// Aggregate variants own their children; binary-safe variants own their
/// payload bytes exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// `+` line, decoded UTF-8 without the trailing CRLF.
    SimpleString(String),
    /// `-` line, same framing as a simple string.
    Error(String),
    /// `:` signed 64-bit decimal.
    Integer(i64),
    /// `$` length-prefixed payload, byte-exact.
    BulkString(Vec<u8>),
    /// `$-1`, `*-1`, `~-1` or `>-1`.
    Null,
    /// `*` sequence of nested values.
    Array(Vec<RespValue>),
    /// `,` IEEE-754 double, including `inf`, `-inf` and `nan`.
    Double(f64),
    /// `#` exactly `t` or `f`.
    Boolean(bool),
    /// `(` arbitrary-precision integer kept as its textual digits.
    BigNumber(String),
    /// `!` same framing as a bulk string, semantically an error.
    BlobError(Vec<u8>),
    /// `=` bulk-style payload whose first three bytes are an encoding tag
    /// followed by `:`. The payload is kept whole; see
    /// [`RespValue::verbatim_parts`].
    VerbatimString(Vec<u8>),
    /// `%` key/value pairs in arrival order.
    Map(Vec<(RespValue, RespValue)>),
    /// `~` unordered collection, kept in arrival order.
    Set(Vec<RespValue>),
    /// `|` metadata pairs prefixing the following value; dispatched as an
    /// independent frame.
    Attribute(Vec<(RespValue, RespValue)>),
    /// `>` server-initiated message.
    Push(Vec<RespValue>),
}

impl RespValue {
    /// The dispatch kind of this value.
    pub fn kind(&self) -> DataKind {
        match self {
            RespValue::SimpleString(_) => DataKind::SimpleString,
            RespValue::Error(_) => DataKind::Error,
            RespValue::Integer(_) => DataKind::Integer,
            RespValue::BulkString(_) => DataKind::BulkString,
            RespValue::Null => DataKind::Null,
            RespValue::Array(_) => DataKind::Array,
            RespValue::Double(_) => DataKind::Double,
            RespValue::Boolean(_) => DataKind::Boolean,
            RespValue::BigNumber(_) => DataKind::BigNumber,
            RespValue::BlobError(_) => DataKind::BlobError,
            RespValue::VerbatimString(_) => DataKind::VerbatimString,
            RespValue::Map(_) => DataKind::Map,
            RespValue::Set(_) => DataKind::Set,
            RespValue::Attribute(_) => DataKind::Attribute,
            RespValue::Push(_) => DataKind::Push,
        }
    }

    /// Whether this value, or any value nested inside it, only exists in
    /// the RESP3 dialect. Drives the per-connection dialect upgrade.
    pub fn requires_resp3(&self) -> bool {
        match self {
            RespValue::SimpleString(_)
            | RespValue::Error(_)
            | RespValue::Integer(_)
            | RespValue::BulkString(_)
            | RespValue::Null => false,
            RespValue::Array(items) => items.iter().any(RespValue::requires_resp3),
            RespValue::Double(_)
            | RespValue::Boolean(_)
            | RespValue::BigNumber(_)
            | RespValue::BlobError(_)
            | RespValue::VerbatimString(_)
            | RespValue::Map(_)
            | RespValue::Set(_)
            | RespValue::Attribute(_)
            | RespValue::Push(_) => true,
        }
    }

    /// Splits a verbatim string into its 3-byte encoding tag and content.
    ///
    /// Returns `None` for every other variant. The parser guarantees the
    /// payload is at least four bytes with `:` at index 3.
    pub fn verbatim_parts(&self) -> Option<(&[u8], &[u8])> {
        match self {
            RespValue::VerbatimString(payload) if payload.len() >= 4 => {
                Some((&payload[..3], &payload[4..]))
            }
            _ => None,
        }
    }

    /// The verbatim payload bytes of the binary-safe variants.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(bytes)
            | RespValue::BlobError(bytes)
            | RespValue::VerbatimString(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Dispatch kinds: one per [`RespValue`] variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DataKind {
    SimpleString,
    Error,
    Integer,
    BulkString,
    Null,
    Array,
    Double,
    Boolean,
    BigNumber,
    BlobError,
    VerbatimString,
    Map,
    Set,
    Attribute,
    Push,
}

impl DataKind {
    /// Stable name used in log output.
    pub fn name(self) -> &'static str {
        match self {
            DataKind::SimpleString => "simple-string",
            DataKind::Error => "error",
            DataKind::Integer => "integer",
            DataKind::BulkString => "bulk-string",
            DataKind::Null => "null",
            DataKind::Array => "array",
            DataKind::Double => "double",
            DataKind::Boolean => "boolean",
            DataKind::BigNumber => "big-number",
            DataKind::BlobError => "blob-error",
            DataKind::VerbatimString => "verbatim-string",
            DataKind::Map => "map",
            DataKind::Set => "set",
            DataKind::Attribute => "attribute",
            DataKind::Push => "push",
        }
    }
}

/// One complete frame as it appeared on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The parsed value.
    pub value: RespValue,
    /// The original frame bytes: tag, header, payload and trailing CRLFs.
    pub raw: Vec<u8>,
}

impl Frame {
    /// Number of buffer bytes this frame consumed.
    pub fn consumed(&self) -> usize {
        self.raw.len()
    }

    /// The wire tag the frame started with.
    pub fn tag(&self) -> Option<Tag> {
        self.raw.first().copied().and_then(Tag::from_byte)
    }
}
