//! Top-level reception dispatch: TP segment vs. complete message.

use std::net::SocketAddr;

use crate::error::Result;
use crate::header::SomeIpHeader;
use crate::message::SomeIpMessage;

use super::mapping::AssemblerMapping;
use super::reassembly::SegmentOutcome;
use super::segment::TpSegment;

/// What happened to one received buffer.
#[derive(Debug)]
pub enum ReceptionOutcome {
    /// A TP segment was consumed into its assembler; the message is not
    /// complete yet.
    SegmentForwarded,
    /// A complete SOME/IP message is ready (either it arrived whole, or
    /// this was the final segment of a reassembly).
    MessageForwarded(SomeIpMessage),
    /// The buffer was discarded: an unconfigured TP flow, or a flow that
    /// was cancelled after a protocol violation.
    MessageDropped,
}

/// Routes each received buffer to either direct forwarding or TP
/// reassembly, based only on the SOME/IP header's TP flag.
#[derive(Debug)]
pub struct TransportProtocolReceptionController {
    mapping: AssemblerMapping,
}

impl TransportProtocolReceptionController {
    /// Create a new controller backed by `mapping`.
    pub fn new(mapping: AssemblerMapping) -> Self {
        Self { mapping }
    }

    /// Process one buffer received from `peer_addr`.
    pub fn on_reception(&mut self, data: &[u8], peer_addr: SocketAddr) -> Result<ReceptionOutcome> {
        let header = SomeIpHeader::from_bytes(data)?;

        if !header.message_type.is_tp() {
            let message = SomeIpMessage::from_bytes(data)?;
            return Ok(ReceptionOutcome::MessageForwarded(message));
        }

        let segment = TpSegment::from_bytes(data)?;
        Ok(match self.mapping.on_segment(&segment, peer_addr) {
            None => ReceptionOutcome::MessageDropped,
            Some(SegmentOutcome::InProgress) => ReceptionOutcome::SegmentForwarded,
            Some(SegmentOutcome::Cancelled) => ReceptionOutcome::MessageDropped,
            Some(SegmentOutcome::Complete(message)) => ReceptionOutcome::MessageForwarded(message),
        })
    }

    /// Number of distinct flows with live assembler state.
    pub fn active_flows(&self) -> usize {
        self.mapping.active_flows()
    }
}
