//! SOME/IP Transport Protocol (TP) for large message segmentation.
//!
//! SOME/IP-TP enables sending messages larger than the maximum UDP datagram size
//! by segmenting them into multiple smaller packets and reassembling on the receiver.
//!
//! # Overview
//!
//! - Messages are split into segments of up to ~1392 bytes each
//! - Each segment includes a 4-byte TP header after the SOME/IP header
//! - The TP header contains offset (in 16-byte units) and a "more segments" flag
//! - Message type has the TP flag (0x20) OR'd in
//! - [`TpSegmenter`] drives sending with configurable pacing; [`AssemblerMapping`]
//!   and [`TransportProtocolReceptionController`] drive receiving, dispatching
//!   segments to the per-flow [`Assembler`] a configuration table selects
//!
//! # Example
//!
//! ```no_run
//! use someip_transport_core::tp::{TpUdpClient, TpUdpServer};
//! use someip_transport_core::{SomeIpMessage, ServiceId, MethodId};
//!
//! // Client automatically segments large messages
//! let mut client = TpUdpClient::new().unwrap();
//!
//! let request = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
//!     .payload_vec(vec![0u8; 5000]) // Larger than single UDP packet
//!     .build();
//!
//! // Message is automatically segmented and sent
//! client.send_to("127.0.0.1:30490".parse().unwrap(), request).unwrap();
//! ```

mod client;
mod controller;
mod header;
mod mapping;
mod reassembly;
mod segment;
mod server;

pub use client::TpUdpClient;
pub use controller::{ReceptionOutcome, TransportProtocolReceptionController};
pub use header::{TpHeader, TP_HEADER_SIZE};
pub use mapping::{AssemblerMapping, AssemblerMappingConfig, AssemblerMappingEntry, AssemblerMappingKey};
pub use reassembly::{Assembler, FlowKey, SegmentOutcome};
pub use segment::{
    needs_segmentation, TickOutcome, TpSegment, TpSegmenter, TpSegmenterConfig,
    DEFAULT_MAX_SEGMENT_PAYLOAD, MAX_TP_SEGMENT_LENGTH, MIN_TP_SEGMENT_LENGTH,
};
pub use server::TpUdpServer;

#[cfg(feature = "tokio")]
mod segment_async;
#[cfg(feature = "tokio")]
pub use segment_async::AsyncTpSegmenter;
