//! Error types for the transport core.
//!
//! Errors fall into the three families this crate's components care
//! about: protocol errors at the wire (caught and turned into a flow
//! cancellation, never propagated past the reassembler), transport
//! errors at the connection (surfaced to callers and fanned out to
//! listeners), and usage errors at the API surface (contract
//! violations, reported as a panic rather than a `Result`; see
//! `router` for where those live).

use std::io;
use thiserror::Error;

/// Errors that can occur in the transport core.
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A SOME/IP header could not be parsed because the buffer was too
    /// short.
    #[error("SOME/IP header too short: expected at least {expected} bytes, got {actual}")]
    HeaderTooShort { expected: usize, actual: usize },

    /// A SOME/IP-TP header could not be parsed because the buffer was
    /// too short.
    #[error("SOME/IP-TP header too short: expected at least {expected} bytes, got {actual}")]
    TpHeaderTooShort { expected: usize, actual: usize },

    /// Message length field disagreed with the actual buffer size.
    #[error("message length mismatch: header says {header_length} bytes, got {actual_length}")]
    LengthMismatch {
        header_length: u32,
        actual_length: usize,
    },

    /// A write would have produced a `length` field that does not fit
    /// in a u32.
    #[error("payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// A TP segment's offset or payload length violated the 16-byte
    /// alignment rule.
    #[error("TP segment misaligned at offset {offset}: {reason}")]
    InvalidTpAlignment { offset: u32, reason: &'static str },

    /// A TP segment would have been written outside the assembler's
    /// reassembly buffer.
    #[error("TP segment at offset {offset} with size {size} overflows max message size {max}")]
    AssemblyOverflow { offset: u32, size: usize, max: usize },

    /// The MF=0 segment arrived without the union of absorbed bytes
    /// covering offset 0, or otherwise failed the continuity check.
    #[error("TP reassembly is discontinuous: {reason}")]
    AssemblyDiscontinuous { reason: &'static str },

    /// Segmenter input parameters were out of bounds.
    #[error("invalid TP segmentation parameters: {reason}")]
    InvalidSegmentParams { reason: &'static str },

    /// The connection was closed, locally or by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// A blocking `connect()` call exceeded its deadline without the
    /// reactor completing the asynchronous establishment.
    #[error("connect timed out")]
    ConnectTimeout,

    /// An IPC proxy<->skeleton header could not be parsed because the
    /// buffer was too short.
    #[error("IPC header too short: expected at least {expected} bytes, got {actual}")]
    IpcHeaderTooShort { expected: usize, actual: usize },

    /// An IPC proxy<->skeleton header carried a kind byte this crate
    /// does not recognize.
    #[error("unknown IPC message kind: {0}")]
    UnknownIpcKind(u8),
}

/// Result type alias used throughout the transport core.
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Check if this error is recoverable (transient, worth retrying at
    /// a higher layer).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if e.kind() == io::ErrorKind::WouldBlock
                || e.kind() == io::ErrorKind::TimedOut
                || e.kind() == io::ErrorKind::Interrupted
        ) || matches!(self, Self::ConnectTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::HeaderTooShort {
            expected: 16,
            actual: 8,
        };
        assert_eq!(
            format!("{err}"),
            "SOME/IP header too short: expected at least 16 bytes, got 8"
        );

        let err = TransportError::AssemblyOverflow {
            offset: 0,
            size: 80,
            max: 64,
        };
        assert_eq!(
            format!("{err}"),
            "TP segment at offset 0 with size 80 overflows max message size 64"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "test");
        let err: TransportError = io_err.into();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn test_is_recoverable() {
        let err = TransportError::Io(io::Error::new(io::ErrorKind::WouldBlock, "would block"));
        assert!(err.is_recoverable());

        let err = TransportError::ConnectionClosed;
        assert!(!err.is_recoverable());

        assert!(TransportError::ConnectTimeout.is_recoverable());
    }
}
