//! SOME/IP transport core: TP segmentation/reassembly and a proxy-side
//! connection stack for in-vehicle service-oriented middleware.
//!
//! This crate implements the SOME/IP (Scalable service-Oriented
//! MiddlewarE over IP) wire format, SOME/IP-TP message segmentation and
//! reassembly, and the connection/router components a communication
//! proxy builds its transport layer from.
//!
//! # Features
//!
//! - Complete SOME/IP message header support, with tolerant parsing of
//!   unrecognized protocol version, message type, and return code values
//! - TCP and UDP transport layers, synchronous and (behind the `tokio`
//!   feature) asynchronous
//! - SOME/IP-TP segmentation with configurable pacing, and
//!   configuration-table-driven reassembly keyed by service/method/flow
//! - An invisible sample cache, router, and connection proxy suitable
//!   for a proxy's transport core
//! - Type-safe service, method, client, and session IDs
//! - Request/response pattern support and fire-and-forget notifications
//!
//! # Example
//!
//! ```no_run
//! use someip_transport_core::{SomeIpMessage, ServiceId, MethodId, ClientId};
//! use someip_transport_core::transport::TcpClient;
//!
//! // Create a request message
//! let request = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
//!     .client_id(ClientId(0x0100))
//!     .payload(b"hello".as_slice())
//!     .build();
//!
//! // Send via TCP and receive response
//! let mut client = TcpClient::connect("127.0.0.1:30490").unwrap();
//! let response = client.call(request).unwrap();
//!
//! println!("Response: {:?}", response.payload);
//! ```
//!
//! # Protocol Overview
//!
//! SOME/IP messages consist of a 16-byte header followed by an optional payload:
//!
//! ```text
//! +--------+--------+--------+--------+
//! |    Service ID   |   Method ID     |  (4 bytes)
//! +--------+--------+--------+--------+
//! |           Length                  |  (4 bytes)
//! +--------+--------+--------+--------+
//! |    Client ID    |   Session ID    |  (4 bytes)
//! +--------+--------+--------+--------+
//! |Proto|Iface|MsgType|RetCode|        (4 bytes)
//! +--------+--------+--------+--------+
//! |           Payload ...             |  (variable)
//! +--------+--------+--------+--------+
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod header;
pub mod message;
pub mod router;
pub mod sample_cache;
pub mod tp;
pub mod transport;
pub mod types;

// Async modules (require tokio feature)
#[cfg(feature = "tokio")]
pub mod codec_async;
#[cfg(feature = "tokio")]
pub mod transport_async;

// Re-export commonly used types at the crate root
pub use error::{Result, TransportError};
pub use header::{ClientId, MethodId, ServiceId, SessionId, SomeIpHeader, HEADER_SIZE};
pub use message::{MessageBuilder, SomeIpMessage};
pub use tp::{Assembler, FlowKey, TpSegment, TpSegmenter, TpUdpClient, TpUdpServer};
pub use types::{MessageType, ReturnCode, PROTOCOL_VERSION};
