//! The proxy<->skeleton IPC wire.
//!
//! This is a distinct, local wire from the SOME/IP network wire that
//! [`crate::header::SomeIpHeader`] describes: it carries a family of
//! messages distinguished by an explicit kind discriminant (request,
//! response, notification, subscribe-ack, ...) rather than SOME/IP's
//! message-type byte, and it never leaves the host. The two headers are
//! encoded independently and must not be confused with one another.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{Result, TransportError};
use crate::header::{ClientId, MethodId};
use crate::router::ServiceInstanceId;

/// Size in bytes of the encoded [`IpcHeader`], not counting the payload
/// that follows it.
pub const IPC_HEADER_SIZE: usize = 11;

/// Discriminates the kind of message carried over the proxy<->skeleton
/// wire. Disjoint from [`crate::types::MessageType`]: a `Response` here
/// and a SOME/IP `Response` are different bytes on different wires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcMessageKind {
    Request,
    RequestNoReturn,
    Notification,
    Response,
    ErrorResponse,
    ApplicationError,
    SubscribeEvent,
    UnsubscribeEvent,
    SubscribeAck,
    SubscribeNack,
}

impl IpcMessageKind {
    fn to_byte(self) -> u8 {
        match self {
            Self::Request => 0x00,
            Self::RequestNoReturn => 0x01,
            Self::Notification => 0x02,
            Self::Response => 0x03,
            Self::ErrorResponse => 0x04,
            Self::ApplicationError => 0x05,
            Self::SubscribeEvent => 0x06,
            Self::UnsubscribeEvent => 0x07,
            Self::SubscribeAck => 0x08,
            Self::SubscribeNack => 0x09,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        Ok(match byte {
            0x00 => Self::Request,
            0x01 => Self::RequestNoReturn,
            0x02 => Self::Notification,
            0x03 => Self::Response,
            0x04 => Self::ErrorResponse,
            0x05 => Self::ApplicationError,
            0x06 => Self::SubscribeEvent,
            0x07 => Self::UnsubscribeEvent,
            0x08 => Self::SubscribeAck,
            0x09 => Self::SubscribeNack,
            other => return Err(TransportError::UnknownIpcKind(other)),
        })
    }

    /// Whether this kind carries an application payload dispatched to a
    /// method/event backend. Subscribe/unsubscribe/ack/nack carry at
    /// most a small control payload.
    pub fn expects_payload(self) -> bool {
        matches!(
            self,
            Self::Request
                | Self::RequestNoReturn
                | Self::Notification
                | Self::Response
                | Self::ErrorResponse
                | Self::ApplicationError
        )
    }
}

/// Kind-specific header for one IPC message: every kind carries at
/// least the service instance, client id, and method-or-event id the
/// spec requires for dispatch; the kind discriminant selects how the
/// connection proxy routes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcHeader {
    pub kind: IpcMessageKind,
    pub service_instance: ServiceInstanceId,
    pub client_id: ClientId,
    pub method_or_event_id: MethodId,
}

impl IpcHeader {
    fn to_bytes(self, payload_len: u32) -> [u8; IPC_HEADER_SIZE] {
        let mut buf = [0u8; IPC_HEADER_SIZE];
        buf[0] = self.kind.to_byte();
        buf[1..3].copy_from_slice(&self.service_instance.0.to_be_bytes());
        buf[3..5].copy_from_slice(&self.client_id.0.to_be_bytes());
        buf[5..7].copy_from_slice(&self.method_or_event_id.0.to_be_bytes());
        buf[7..11].copy_from_slice(&payload_len.to_be_bytes());
        buf
    }

    fn from_bytes(data: &[u8]) -> Result<(Self, u32)> {
        if data.len() < IPC_HEADER_SIZE {
            return Err(TransportError::IpcHeaderTooShort {
                expected: IPC_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let kind = IpcMessageKind::from_byte(data[0])?;
        let service_instance = ServiceInstanceId(u16::from_be_bytes([data[1], data[2]]));
        let client_id = ClientId(u16::from_be_bytes([data[3], data[4]]));
        let method_or_event_id = MethodId(u16::from_be_bytes([data[5], data[6]]));
        let payload_len = u32::from_be_bytes([data[7], data[8], data[9], data[10]]);
        Ok((
            Self {
                kind,
                service_instance,
                client_id,
                method_or_event_id,
            },
            payload_len,
        ))
    }
}

/// A complete IPC message (kind-specific header + payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcMessage {
    pub header: IpcHeader,
    pub payload: Bytes,
}

impl IpcMessage {
    /// Build a message of `kind` addressed at `service_instance`,
    /// `client_id`, `method_or_event_id`, carrying `payload`.
    pub fn new(
        kind: IpcMessageKind,
        service_instance: ServiceInstanceId,
        client_id: ClientId,
        method_or_event_id: MethodId,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            header: IpcHeader {
                kind,
                service_instance,
                client_id,
                method_or_event_id,
            },
            payload: payload.into(),
        }
    }

    /// Build a kind carrying no application payload (subscribe,
    /// unsubscribe, subscribe-ack, subscribe-nack).
    pub fn control(
        kind: IpcMessageKind,
        service_instance: ServiceInstanceId,
        client_id: ClientId,
        method_or_event_id: MethodId,
    ) -> Self {
        Self::new(kind, service_instance, client_id, method_or_event_id, Bytes::new())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(IPC_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.to_bytes(self.payload.len() as u32));
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Read a complete IPC message from an async stream.
pub async fn read_ipc_message_async<R: AsyncRead + Unpin>(reader: &mut R) -> Result<IpcMessage> {
    let mut header_buf = [0u8; IPC_HEADER_SIZE];
    reader.read_exact(&mut header_buf).await?;
    let (header, payload_len) = IpcHeader::from_bytes(&header_buf)?;

    let mut payload = vec![0u8; payload_len as usize];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await?;
    }

    Ok(IpcMessage {
        header,
        payload: Bytes::from(payload),
    })
}

/// Write a complete IPC message to an async stream.
pub async fn write_ipc_message_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &IpcMessage,
) -> Result<()> {
    let payload_len = u32::try_from(message.payload.len()).map_err(|_| TransportError::PayloadTooLarge {
        size: message.payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&message.header.to_bytes(payload_len)).await?;
    writer.write_all(&message.payload).await?;
    Ok(())
}

/// An async TCP connection wrapper carrying [`IpcMessage`] framing, for
/// the proxy<->skeleton wire. Parallel to
/// [`crate::transport_async::tcp::AsyncTcpConnection`], which frames
/// plain SOME/IP messages for the network-facing side instead.
pub struct IpcConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    peer_addr: SocketAddr,
}

impl IpcConnection {
    /// Create a new connection from a `TcpStream`.
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            peer_addr,
        })
    }

    /// Get the peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read an IPC message from the connection.
    pub async fn read_message(&mut self) -> Result<IpcMessage> {
        read_ipc_message_async(&mut self.reader).await
    }

    /// Write an IPC message to the connection.
    pub async fn write_message(&mut self, message: &IpcMessage) -> Result<()> {
        write_ipc_message_async(&mut self.writer, message).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: IpcMessage) -> IpcMessage {
        let bytes = msg.to_bytes();
        let (header, payload_len) = IpcHeader::from_bytes(&bytes).unwrap();
        let payload = Bytes::copy_from_slice(&bytes[IPC_HEADER_SIZE..IPC_HEADER_SIZE + payload_len as usize]);
        IpcMessage { header, payload }
    }

    #[test]
    fn test_ipc_message_roundtrip() {
        let msg = IpcMessage::new(
            IpcMessageKind::Response,
            ServiceInstanceId(0x1234),
            ClientId(0x0001),
            MethodId(0x0042),
            b"hello".as_slice(),
        );
        let parsed = roundtrip(msg.clone());
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_control_message_has_empty_payload() {
        let msg = IpcMessage::control(
            IpcMessageKind::SubscribeAck,
            ServiceInstanceId(0x1234),
            ClientId(0x0001),
            MethodId::event(1),
        );
        assert!(msg.payload.is_empty());
        assert_eq!(msg.header.kind, IpcMessageKind::SubscribeAck);
    }

    #[test]
    fn test_unknown_kind_byte_rejected() {
        let mut bytes = IpcMessage::control(
            IpcMessageKind::Request,
            ServiceInstanceId(1),
            ClientId(1),
            MethodId(1),
        )
        .to_bytes();
        bytes[0] = 0xFF;
        let result = IpcHeader::from_bytes(&bytes);
        assert!(matches!(result, Err(TransportError::UnknownIpcKind(0xFF))));
    }

    #[test]
    fn test_header_too_short() {
        let bytes = [0u8; 4];
        let result = IpcHeader::from_bytes(&bytes);
        assert!(matches!(result, Err(TransportError::IpcHeaderTooShort { .. })));
    }
}
