//! Configuration-table-driven assembler lookup.
//!
//! Maps an incoming segment's `(service, major_version, method,
//! non_tp_message_type)` to the maximum reassembled size it is allowed to
//! grow to, then dispatches it to the right per-flow [`Assembler`],
//! creating one on first sight. Flows with no matching table entry are
//! dropped rather than assembled with a guessed size.

use std::collections::HashMap;
use std::net::SocketAddr;

use super::reassembly::{Assembler, FlowKey, SegmentOutcome};
use super::segment::TpSegment;
use crate::types::MessageType;

/// Key identifying one configured assembler entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssemblerMappingKey {
    /// Service ID.
    pub service_id: crate::header::ServiceId,
    /// Major interface version.
    pub major_version: u8,
    /// Method ID.
    pub method_id: crate::header::MethodId,
    /// Non-TP message type this entry applies to (requests assemble
    /// differently from responses, for instance).
    pub message_type: MessageType,
}

/// Per-entry reassembly policy.
#[derive(Debug, Clone, Copy)]
pub struct AssemblerMappingEntry {
    /// Maximum size a reassembled message for this entry may reach.
    pub max_rx_size: usize,
    /// If true, the assembler's buffer is sized to `max_rx_size` up front
    /// (an arena-style allocation with no later resize); otherwise it
    /// grows on demand starting from a small capacity.
    pub deterministic_allocation: bool,
}

/// Builder for [`AssemblerMapping`]'s configuration table.
#[derive(Debug, Clone, Default)]
pub struct AssemblerMappingConfig {
    entries: HashMap<AssemblerMappingKey, AssemblerMappingEntry>,
    /// Initial capacity reservation for the assembler flow vector.
    pub pre_allocation_size: usize,
}

impl AssemblerMappingConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry to the table.
    pub fn with_entry(mut self, key: AssemblerMappingKey, entry: AssemblerMappingEntry) -> Self {
        self.entries.insert(key, entry);
        self
    }

    /// Build a configuration from an iterator of entries.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (AssemblerMappingKey, AssemblerMappingEntry)>,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            pre_allocation_size: 0,
        }
    }

    /// Reserve capacity for this many concurrently active flows.
    pub fn with_pre_allocation_size(mut self, size: usize) -> Self {
        self.pre_allocation_size = size;
        self
    }

    fn lookup(&self, key: &AssemblerMappingKey) -> Option<&AssemblerMappingEntry> {
        self.entries.get(key)
    }
}

/// Dispatches incoming TP segments to a per-flow [`Assembler`] chosen by
/// the configuration table, dropping segments for flows that were never
/// configured.
#[derive(Debug)]
pub struct AssemblerMapping {
    config: AssemblerMappingConfig,
    flows: Vec<(FlowKey, Assembler)>,
}

impl AssemblerMapping {
    /// Create a new mapping from `config`.
    pub fn new(config: AssemblerMappingConfig) -> Self {
        let flows = Vec::with_capacity(config.pre_allocation_size);
        Self { config, flows }
    }

    fn mapping_key(segment: &TpSegment) -> AssemblerMappingKey {
        AssemblerMappingKey {
            service_id: segment.header.service_id,
            major_version: segment.header.interface_version,
            method_id: segment.header.method_id,
            message_type: segment.header.message_type.to_base(),
        }
    }

    /// Feed one segment, received from `peer_addr`, through the table
    /// lookup and into its assembler.
    ///
    /// Returns `None` if the flow is not configured (the segment is
    /// dropped and the drop is logged) or if more segments are still
    /// needed; returns `Some` once the message completes.
    pub fn on_segment(&mut self, segment: &TpSegment, peer_addr: SocketAddr) -> Option<SegmentOutcome> {
        let mapping_key = Self::mapping_key(segment);
        let entry = match self.config.lookup(&mapping_key) {
            Some(entry) => *entry,
            None => {
                tracing::debug!(
                    service = %segment.header.service_id,
                    method = %segment.header.method_id,
                    major_version = segment.header.interface_version,
                    "dropping TP segment: no AssemblerMapping entry configured for this flow"
                );
                return None;
            }
        };

        let flow = FlowKey::from_header(&segment.header, peer_addr);
        let assembler = match self.flows.iter_mut().find(|(k, _)| *k == flow) {
            Some((_, assembler)) => assembler,
            None => {
                let mut assembler = Assembler::new(flow, entry.max_rx_size);
                if entry.deterministic_allocation {
                    assembler.reserve(entry.max_rx_size);
                }
                self.flows.push((flow, assembler));
                &mut self.flows.last_mut().expect("just pushed").1
            }
        };

        Some(assembler.on_segment(segment))
    }

    /// Number of distinct flows with live assembler state.
    pub fn active_flows(&self) -> usize {
        self.flows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ClientId, MethodId, ServiceId, SessionId};
    use crate::message::SomeIpMessage;
    use crate::tp::segment::{TpSegmenter, TpSegmenterConfig};
    use std::time::Duration;

    fn peer_addr_a() -> SocketAddr {
        "127.0.0.1:30509".parse().unwrap()
    }

    fn peer_addr_b() -> SocketAddr {
        "127.0.0.1:30510".parse().unwrap()
    }

    fn segment_all(msg: &SomeIpMessage) -> Vec<TpSegment> {
        let config = TpSegmenterConfig::default();
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
    fn test_configured_flow_reassembles() {
        let key = AssemblerMappingKey {
            service_id: ServiceId(0x1234),
            major_version: 1,
            method_id: MethodId(0x0001),
            message_type: MessageType::Request,
        };
        let entry = AssemblerMappingEntry {
            max_rx_size: 1 << 20,
            deterministic_allocation: false,
        };
        let config = AssemblerMappingConfig::new().with_entry(key, entry);
        let mut mapping = AssemblerMapping::new(config);

        let msg = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .client_id(ClientId(1))
            .session_id(SessionId(1))
            .payload_vec(vec![0u8; 3000])
            .build();
        let segments = segment_all(&msg);

        assert!(mapping.on_segment(&segments[0], peer_addr_a()).is_some());
        assert!(mapping.on_segment(&segments[1], peer_addr_a()).is_some());
        assert!(matches!(
            mapping.on_segment(&segments[2], peer_addr_a()),
            Some(SegmentOutcome::Complete(_))
        ));
        assert_eq!(mapping.active_flows(), 1);
    }

    #[test]
    fn test_unconfigured_flow_is_dropped() {
        let mut mapping = AssemblerMapping::new(AssemblerMappingConfig::new());

        let msg = SomeIpMessage::request(ServiceId(0x5678), MethodId(0x0002))
            .payload_vec(vec![0u8; 3000])
            .build();
        let segments = segment_all(&msg);

        assert!(mapping.on_segment(&segments[0], peer_addr_a()).is_none());
        assert_eq!(mapping.active_flows(), 0);
    }

    #[test]
    fn test_distinct_peers_get_independent_assemblers() {
        let key = AssemblerMappingKey {
            service_id: ServiceId(0x1234),
            major_version: 1,
            method_id: MethodId(0x0001),
            message_type: MessageType::Request,
        };
        let entry = AssemblerMappingEntry {
            max_rx_size: 1 << 20,
            deterministic_allocation: false,
        };
        let config = AssemblerMappingConfig::new().with_entry(key, entry);
        let mut mapping = AssemblerMapping::new(config);

        // Same service/method/client from two different peers, interleaved,
        // must not corrupt each other's reassembly.
        let msg_a = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .client_id(ClientId(1))
            .session_id(SessionId(1))
            .payload_vec(vec![0xAAu8; 3000])
            .build();
        let msg_b = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .client_id(ClientId(1))
            .session_id(SessionId(1))
            .payload_vec(vec![0xBBu8; 3000])
            .build();
        let segments_a = segment_all(&msg_a);
        let segments_b = segment_all(&msg_b);

        mapping.on_segment(&segments_a[0], peer_addr_a());
        mapping.on_segment(&segments_b[0], peer_addr_b());
        mapping.on_segment(&segments_a[1], peer_addr_a());
        mapping.on_segment(&segments_b[1], peer_addr_b());

        assert_eq!(mapping.active_flows(), 2);

        match mapping.on_segment(&segments_a[2], peer_addr_a()) {
            Some(SegmentOutcome::Complete(message)) => {
                assert!(message.payload.iter().all(|&b| b == 0xAA));
            }
            other => panic!("expected Complete for peer a, got {other:?}"),
        }
        match mapping.on_segment(&segments_b[2], peer_addr_b()) {
            Some(SegmentOutcome::Complete(message)) => {
                assert!(message.payload.iter().all(|&b| b == 0xBB));
            }
            other => panic!("expected Complete for peer b, got {other:?}"),
        }
    }
}
