//! SOME/IP-TP message reassembly.
//!
//! Each flow (the sender/receiver pair identified by [`FlowKey`]) gets one
//! [`Assembler`] that reconstructs the original payload into a flat,
//! growable buffer and tracks which byte ranges have been filled. This
//! mirrors a flat-buffer-plus-ranges reassembly design rather than a
//! BTreeMap of per-offset chunks: segments are copied directly into their
//! final position, so overlapping retransmissions simply overwrite
//! whatever was there (last writer wins) instead of needing reconciliation.

use std::net::SocketAddr;
use std::ops::Range;

use bytes::Bytes;

use crate::header::{ClientId, MethodId, ServiceId, SomeIpHeader};
use crate::message::SomeIpMessage;

use super::segment::TpSegment;

/// Identifies one reassembly flow: the sender/service/method tuple an
/// [`Assembler`] instance is dedicated to. Session id is tracked inside the
/// assembler itself (a session change resets its state) rather than being
/// part of the key, so one `Assembler` can live across many messages from
/// the same flow.
///
/// The peer address is part of the key because a single socket (the TP UDP
/// server in particular) can be mid-reassembly for several distinct peers
/// at once; without it, two senders racing the same
/// `(service_id, method_id, client_id)` would share one assembler and
/// corrupt each other's reassembly. `interface_version` is included for the
/// same reason requests against different major interface versions of a
/// method must not be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    /// Service ID.
    pub service_id: ServiceId,
    /// Method ID.
    pub method_id: MethodId,
    /// Client ID.
    pub client_id: ClientId,
    /// Interface version the segment was sent against.
    pub interface_version: u8,
    /// Address of the peer this flow's segments arrive from.
    pub peer_addr: SocketAddr,
}

impl FlowKey {
    /// Derive a flow key from a segment's SOME/IP header and the address
    /// its segments are arriving from.
    pub fn from_header(header: &SomeIpHeader, peer_addr: SocketAddr) -> Self {
        Self {
            service_id: header.service_id,
            method_id: header.method_id,
            client_id: header.client_id,
            interface_version: header.interface_version,
            peer_addr,
        }
    }
}

/// Result of feeding one segment to an [`Assembler`].
#[derive(Debug)]
pub enum SegmentOutcome {
    /// More segments are needed.
    InProgress,
    /// The message is complete.
    Complete(SomeIpMessage),
    /// The segment violated a protocol invariant (bad alignment, a
    /// conflicting final length, or it would exceed the configured
    /// capacity) and the in-flight message was cancelled. This never
    /// surfaces as an `Err`: a malformed flow only costs that one message.
    Cancelled,
}

/// Reassembles the segments of one TP flow into complete SOME/IP messages.
#[derive(Debug)]
pub struct Assembler {
    flow: FlowKey,
    max_message_size: usize,
    session_id: Option<crate::header::SessionId>,
    base_header: Option<SomeIpHeader>,
    data: Vec<u8>,
    sections: Vec<Range<usize>>,
    final_end: Option<usize>,
    cancelled: bool,
}

impl Assembler {
    /// Create a new, empty assembler for `flow`, bounding reassembled
    /// messages to `max_message_size` bytes.
    pub fn new(flow: FlowKey, max_message_size: usize) -> Self {
        Self {
            flow,
            max_message_size,
            session_id: None,
            base_header: None,
            data: Vec::new(),
            sections: Vec::new(),
            final_end: None,
            cancelled: false,
        }
    }

    /// The flow this assembler belongs to.
    pub fn flow(&self) -> FlowKey {
        self.flow
    }

    /// Whether the in-flight message was cancelled and is waiting for a new
    /// session id to start over.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Pre-allocate the backing buffer to `capacity` bytes, for the
    /// arena-style allocation mode where the buffer is sized once up
    /// front instead of growing as segments arrive.
    pub fn reserve(&mut self, capacity: usize) {
        if self.data.capacity() < capacity {
            self.data.reserve(capacity - self.data.capacity());
        }
    }

    /// Drop all in-flight state and start clean, as if newly created.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.base_header = None;
        self.data.clear();
        self.sections.clear();
        self.final_end = None;
        self.cancelled = false;
    }

    /// Feed one segment belonging to this flow.
    pub fn on_segment(&mut self, segment: &TpSegment) -> SegmentOutcome {
        let incoming_session = segment.header.session_id;
        if self.session_id.is_some() && self.session_id != Some(incoming_session) {
            self.reset();
        }
        self.session_id = Some(incoming_session);

        if self.cancelled {
            return SegmentOutcome::Cancelled;
        }

        if self.base_header.is_none() {
            self.base_header = Some(segment.header.clone());
        }

        let offset = segment.byte_offset();
        let len = segment.payload.len();

        if !segment.is_last() && len % 16 != 0 {
            tracing::debug!(
                service = %segment.header.service_id,
                method = %segment.header.method_id,
                client = %segment.header.client_id,
                offset,
                len,
                "cancelling TP flow: non-final segment payload is not 16-byte aligned"
            );
            self.cancelled = true;
            return SegmentOutcome::Cancelled;
        }

        let end = match offset.checked_add(len) {
            Some(end) if end <= self.max_message_size => end,
            _ => {
                tracing::debug!(
                    service = %segment.header.service_id,
                    method = %segment.header.method_id,
                    client = %segment.header.client_id,
                    offset,
                    len,
                    max = self.max_message_size,
                    "cancelling TP flow: segment would exceed maximum message size"
                );
                self.cancelled = true;
                return SegmentOutcome::Cancelled;
            }
        };

        if segment.is_last() {
            if let Some(prev_end) = self.final_end {
                if prev_end != end {
                    tracing::debug!(
                        service = %segment.header.service_id,
                        method = %segment.header.method_id,
                        client = %segment.header.client_id,
                        "cancelling TP flow: conflicting final length between retransmitted last segments"
                    );
                    self.cancelled = true;
                    return SegmentOutcome::Cancelled;
                }
            }
            self.final_end = Some(end);
        }

        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(&segment.payload);
        self.merge_range(offset..end);

        if let Some(final_end) = self.final_end {
            if self.covers(0..final_end) {
                return match self.finalize(final_end) {
                    Some(message) => SegmentOutcome::Complete(message),
                    None => {
                        tracing::debug!(
                            service = %segment.header.service_id,
                            method = %segment.header.method_id,
                            client = %segment.header.client_id,
                            total_len = final_end,
                            "cancelling TP flow: reassembled payload too large for SOME/IP header"
                        );
                        self.cancelled = true;
                        SegmentOutcome::Cancelled
                    }
                };
            }
        }

        SegmentOutcome::InProgress
    }

    fn merge_range(&mut self, new_range: Range<usize>) {
        let mut merged = new_range;
        self.sections.retain(|existing| {
            let overlaps = existing.start <= merged.end && merged.start <= existing.end;
            if overlaps {
                merged.start = merged.start.min(existing.start);
                merged.end = merged.end.max(existing.end);
            }
            !overlaps
        });
        self.sections.push(merged);
        self.sections.sort_by_key(|r| r.start);
    }

    fn covers(&self, span: Range<usize>) -> bool {
        self.sections
            .iter()
            .any(|r| r.start <= span.start && r.end >= span.end)
    }

    /// Builds the reassembled message, resetting flow state either way.
    ///
    /// Returns `None` if the reassembled payload doesn't fit in the
    /// SOME/IP header's `u32` length field; the caller treats that as a
    /// cancelled flow rather than propagating an error.
    fn finalize(&mut self, total_len: usize) -> Option<SomeIpMessage> {
        let mut header = self
            .base_header
            .clone()
            .expect("base_header set before final_end can be reached");
        header.message_type = header.message_type.to_base();

        let payload = Bytes::copy_from_slice(&self.data[..total_len]);
        let message = SomeIpMessage::new(header, payload).ok();

        self.reset();
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ServiceId, SessionId};
    use crate::message::SomeIpMessage;
    use crate::tp::segment::{TpSegmenter, TpSegmenterConfig};
    use std::time::Duration;

    fn test_peer_addr() -> SocketAddr {
        "127.0.0.1:30509".parse().unwrap()
    }

    fn segment_all(msg: &SomeIpMessage) -> Vec<TpSegment> {
        let config = TpSegmenterConfig {
            max_segment_length: super::super::segment::MAX_TP_SEGMENT_LENGTH,
            separation_time: Duration::ZERO,
            burst_size: 1,
        };
        let mut segmenter = TpSegmenter::new();
        let mut out = Vec::new();
        segmenter
            .segment(msg, &config, &mut |burst: &[TpSegment]| {
                out.extend_from_slice(burst);
                true
            })
            .unwrap();
        out
    }

    #[test]
    fn test_reassemble_in_order() {
        let expected: Vec<u8> = (0..3000u16).map(|i| (i % 256) as u8).collect();
        let msg = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .session_id(SessionId(1))
            .payload_vec(expected.clone())
            .build();
        let segments = segment_all(&msg);
        assert_eq!(segments.len(), 3);

        let mut assembler = Assembler::new(FlowKey::from_header(&msg.header, test_peer_addr()), 1 << 20);
        assert!(matches!(
            assembler.on_segment(&segments[0]),
            SegmentOutcome::InProgress
        ));
        assert!(matches!(
            assembler.on_segment(&segments[1]),
            SegmentOutcome::InProgress
        ));
        match assembler.on_segment(&segments[2]) {
            SegmentOutcome::Complete(message) => {
                assert_eq!(message.payload.as_ref(), expected.as_slice());
                assert!(!message.header.message_type.is_tp());
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn test_reassemble_out_of_order() {
        let expected: Vec<u8> = (0..3000u16).map(|i| (i % 256) as u8).collect();
        let msg = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .session_id(SessionId(2))
            .payload_vec(expected.clone())
            .build();
        let segments = segment_all(&msg);

        let mut assembler = Assembler::new(FlowKey::from_header(&msg.header, test_peer_addr()), 1 << 20);
        assert!(matches!(
            assembler.on_segment(&segments[2]),
            SegmentOutcome::InProgress
        ));
        assert!(matches!(
            assembler.on_segment(&segments[0]),
            SegmentOutcome::InProgress
        ));
        match assembler.on_segment(&segments[1]) {
            SegmentOutcome::Complete(message) => {
                assert_eq!(message.payload.as_ref(), expected.as_slice());
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn test_overlapping_retransmit_is_last_writer_wins() {
        let expected: Vec<u8> = vec![0xAAu8; 3000];
        let msg = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .session_id(SessionId(3))
            .payload_vec(expected.clone())
            .build();
        let segments = segment_all(&msg);

        let mut assembler = Assembler::new(FlowKey::from_header(&msg.header, test_peer_addr()), 1 << 20);
        assembler.on_segment(&segments[0]);
        // Retransmit segment 0 with different bytes; it should simply overwrite.
        let mut replay = segments[0].clone();
        replay.payload = Bytes::from(vec![0xBBu8; replay.payload.len()]);
        assembler.on_segment(&replay);
        assembler.on_segment(&segments[1]);

        match assembler.on_segment(&segments[2]) {
            SegmentOutcome::Complete(message) => {
                assert!(message.payload[..replay.payload.len()]
                    .iter()
                    .all(|&b| b == 0xBB));
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn test_session_change_resets_in_flight_state() {
        let msg1 = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .session_id(SessionId(10))
            .payload_vec(vec![0u8; 3000])
            .build();
        let segments1 = segment_all(&msg1);

        let msg2 = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .session_id(SessionId(11))
            .payload_vec(vec![1u8; 2000])
            .build();
        let segments2 = segment_all(&msg2);

        let mut assembler = Assembler::new(FlowKey::from_header(&msg1.header, test_peer_addr()), 1 << 20);
        assembler.on_segment(&segments1[0]);
        assembler.on_segment(&segments1[1]);

        for segment in &segments2 {
            if let SegmentOutcome::Complete(message) = assembler.on_segment(segment) {
                assert_eq!(message.header.session_id, SessionId(11));
                assert_eq!(message.payload.as_ref(), vec![1u8; 2000].as_slice());
                return;
            }
        }
        panic!("expected the second message to complete after the session changed");
    }

    #[test]
    fn test_unaligned_non_final_segment_cancels_flow() {
        let msg = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .session_id(SessionId(20))
            .payload_vec(vec![0u8; 3000])
            .build();
        let mut segments = segment_all(&msg);
        // Corrupt the first (non-final) segment's length so it is no longer 16-aligned.
        segments[0].payload = segments[0].payload.slice(0..segments[0].payload.len() - 1);

        let mut assembler = Assembler::new(FlowKey::from_header(&msg.header, test_peer_addr()), 1 << 20);
        assert!(matches!(
            assembler.on_segment(&segments[0]),
            SegmentOutcome::Cancelled
        ));
        assert!(assembler.is_cancelled());
    }

    #[test]
    fn test_oversize_message_cancels_flow() {
        let msg = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .session_id(SessionId(30))
            .payload_vec(vec![0u8; 3000])
            .build();
        let segments = segment_all(&msg);

        let mut assembler = Assembler::new(FlowKey::from_header(&msg.header, test_peer_addr()), 100);
        assert!(matches!(
            assembler.on_segment(&segments[0]),
            SegmentOutcome::Cancelled
        ));
    }
}
