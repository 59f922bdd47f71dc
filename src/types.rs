//! Core SOME/IP types and constants.

/// SOME/IP protocol version used by this crate when building new
/// messages. Received messages are not checked against this constant;
/// `protocol_version` is carried through as an opaque byte (see
/// `header::SomeIpHeader`).
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Bit that distinguishes a TP (segmented) message type from its
/// non-TP peer, per the AUTOSAR convention: the TP variant is the
/// non-TP numeric value with this bit set.
const TP_FLAG: u8 = 0x20;

/// SOME/IP message types as defined in the specification.
///
/// Unknown byte values are represented as `Unknown` rather than
/// rejected: the wire codec never bounds-checks this field, and the
/// receiver must tolerate unrecognized values by treating them as
/// opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Request expecting a response.
    Request,
    /// Request not expecting a response (fire-and-forget).
    RequestNoReturn,
    /// Cyclic or event-based notification.
    Notification,
    /// Response to a request.
    Response,
    /// Error response to a request.
    Error,
    /// TP Request (segmented).
    TpRequest,
    /// TP Request not expecting a response.
    TpRequestNoReturn,
    /// TP Notification.
    TpNotification,
    /// TP Response.
    TpResponse,
    /// TP Error.
    TpError,
    /// Any value not in the closed set above, carried through opaquely.
    Unknown(u8),
}

impl MessageType {
    /// Decode a raw byte value. Never fails: unrecognized values become
    /// `Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Request,
            0x01 => Self::RequestNoReturn,
            0x02 => Self::Notification,
            0x80 => Self::Response,
            0x81 => Self::Error,
            0x20 => Self::TpRequest,
            0x21 => Self::TpRequestNoReturn,
            0x22 => Self::TpNotification,
            0xA0 => Self::TpResponse,
            0xA1 => Self::TpError,
            other => Self::Unknown(other),
        }
    }

    /// Encode back to the raw wire byte.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Request => 0x00,
            Self::RequestNoReturn => 0x01,
            Self::Notification => 0x02,
            Self::Response => 0x80,
            Self::Error => 0x81,
            Self::TpRequest => 0x20,
            Self::TpRequestNoReturn => 0x21,
            Self::TpNotification => 0x22,
            Self::TpResponse => 0xA0,
            Self::TpError => 0xA1,
            Self::Unknown(b) => b,
        }
    }

    /// Check if this message type expects a response.
    pub fn expects_response(&self) -> bool {
        matches!(self, Self::Request | Self::TpRequest)
    }

    /// Check if this is a response message type.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Self::Response | Self::Error | Self::TpResponse | Self::TpError
        )
    }

    /// Check if this is a TP (Transport Protocol) segmented message.
    ///
    /// Defined uniformly as "the TP flag bit is set", so it also
    /// classifies `Unknown` bytes correctly without a dedicated arm.
    pub fn is_tp(&self) -> bool {
        self.to_u8() & TP_FLAG != 0
    }

    /// Map a non-TP message type to its TP-segmented peer. Idempotent
    /// on values that are already TP.
    pub fn to_tp(self) -> Self {
        Self::from_u8(self.to_u8() | TP_FLAG)
    }

    /// Map a TP message type to its non-TP peer. Idempotent on values
    /// that are already non-TP.
    pub fn to_base(self) -> Self {
        Self::from_u8(self.to_u8() & !TP_FLAG)
    }
}

/// SOME/IP return codes as defined in the specification.
///
/// Stored opaquely: return codes are pass-through data as far as this
/// crate is concerned (see `header::SomeIpHeader`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// No error occurred.
    Ok,
    /// An unspecified error occurred.
    NotOk,
    /// The requested Service ID is unknown.
    UnknownService,
    /// The requested Method ID is unknown.
    UnknownMethod,
    /// Service is not ready.
    NotReady,
    /// Service is not reachable.
    NotReachable,
    /// Timeout occurred.
    Timeout,
    /// Wrong protocol version.
    WrongProtocolVersion,
    /// Wrong interface version.
    WrongInterfaceVersion,
    /// Malformed message.
    MalformedMessage,
    /// Wrong message type.
    WrongMessageType,
    /// E2E repeated.
    E2ERepeated,
    /// E2E wrong sequence.
    E2EWrongSequence,
    /// E2E error (not further specified).
    E2E,
    /// E2E not available.
    E2ENotAvailable,
    /// E2E no new data.
    E2ENoNewData,
    /// Any value not in the closed set above, carried through opaquely.
    Unknown(u8),
}

impl ReturnCode {
    /// Decode a raw byte value. Never fails: unrecognized values become
    /// `Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::NotOk,
            0x02 => Self::UnknownService,
            0x03 => Self::UnknownMethod,
            0x04 => Self::NotReady,
            0x05 => Self::NotReachable,
            0x06 => Self::Timeout,
            0x07 => Self::WrongProtocolVersion,
            0x08 => Self::WrongInterfaceVersion,
            0x09 => Self::MalformedMessage,
            0x0A => Self::WrongMessageType,
            0x0B => Self::E2ERepeated,
            0x0C => Self::E2EWrongSequence,
            0x0D => Self::E2E,
            0x0E => Self::E2ENotAvailable,
            0x0F => Self::E2ENoNewData,
            other => Self::Unknown(other),
        }
    }

    /// Encode back to the raw wire byte.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::NotOk => 0x01,
            Self::UnknownService => 0x02,
            Self::UnknownMethod => 0x03,
            Self::NotReady => 0x04,
            Self::NotReachable => 0x05,
            Self::Timeout => 0x06,
            Self::WrongProtocolVersion => 0x07,
            Self::WrongInterfaceVersion => 0x08,
            Self::MalformedMessage => 0x09,
            Self::WrongMessageType => 0x0A,
            Self::E2ERepeated => 0x0B,
            Self::E2EWrongSequence => 0x0C,
            Self::E2E => 0x0D,
            Self::E2ENotAvailable => 0x0E,
            Self::E2ENoNewData => 0x0F,
            Self::Unknown(b) => b,
        }
    }

    /// Check if this return code indicates success.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if this return code indicates an error.
    pub fn is_error(&self) -> bool {
        !self.is_ok()
    }
}

impl Default for ReturnCode {
    fn default() -> Self {
        Self::Ok
    }
}
