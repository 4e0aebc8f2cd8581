//! RESP wire-format parsing.
//!
//! The grammar lives in [`resp`] as a pure function over a byte slice;
//! [`frame_reader`] layers per-connection buffering and compaction on top
//! of it. Parsing never suspends and never touches the socket.

pub mod frame_reader;
mod resp;


pub use frame_reader::FrameReader;

/// Result of parsing operations with error type [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed-input classes. Any of these is fatal for the connection that
/// produced the bytes; none of them affects other connections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The first byte of a frame is not one of the fourteen type tags.
    #[error("unknown type 0x{0:02x}")]
    UnknownType(u8),
    /// `:` header that is not a strict signed 64-bit decimal.
    #[error("bad integer")]
    BadInteger,
    /// `,` header that does not parse as a double.
    #[error("bad double")]
    BadDouble,
    /// `#` header other than `t` or `f`.
    #[error("bad boolean")]
    BadBoolean,
    /// `(` header that is not an optionally-signed digit run.
    #[error("bad big number")]
    BadBigNumber,
    /// Length or count header that is not a strict decimal or the `-1`
    /// null sentinel, or a `-1` where null is not allowed.
    #[error("bad length")]
    BadLength,
    /// A `+` or `-` line containing a bare CR or LF.
    #[error("line contains bare CR or LF")]
    StrayNewline,
    /// A `+` or `-` line that is not valid UTF-8.
    #[error("invalid utf-8 in line")]
    InvalidUtf8,
    /// A length-prefixed payload not followed by CRLF.
    #[error("missing terminator")]
    MissingTerminator,
    /// A `=` payload shorter than four bytes or without `:` at index 3.
    #[error("bad verbatim string")]
    BadVerbatim,
    /// Aggregate count above the configured element limit.
    #[error("overflow: aggregate count too large")]
    ElementLimit,
    /// Aggregate nesting above the configured depth limit.
    #[error("overflow: nesting too deep")]
    DepthLimit,
    /// Bulk payload length above the configured maximum.
    #[error("too large")]
    PayloadTooLarge,
    /// The per-connection byte buffer would exceed its cap.
    #[error("buffer overflow")]
    BufferOverflow,
}
