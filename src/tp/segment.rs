//! SOME/IP-TP segment handling and the sending-side segmenter.

use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::header::{SomeIpHeader, HEADER_SIZE};
use crate::message::SomeIpMessage;

use super::header::{TpHeader, TP_HEADER_SIZE};

/// Default maximum segment payload size, 16-byte aligned, derived from the
/// by-convention maximum segment length of 1400 bytes.
pub const DEFAULT_MAX_SEGMENT_PAYLOAD: usize = 1392;

/// Smallest `max_segment_length` that still carries one aligned chunk of
/// payload after the TP header.
pub const MIN_TP_SEGMENT_LENGTH: usize = TP_HEADER_SIZE + 16;

/// Largest `max_segment_length` this crate accepts, by convention for
/// UDP MTU-conforming deployments.
pub const MAX_TP_SEGMENT_LENGTH: usize = 1400;

/// A single TP segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpSegment {
    /// SOME/IP header (with TP message type).
    pub header: SomeIpHeader,
    /// TP header.
    pub tp_header: TpHeader,
    /// Segment payload (portion of original payload).
    pub payload: Bytes,
}

impl TpSegment {
    /// Create a new TP segment.
    pub fn new(header: SomeIpHeader, tp_header: TpHeader, payload: Bytes) -> Self {
        Self {
            header,
            tp_header,
            payload,
        }
    }

    /// Parse a TP segment from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let min_size = HEADER_SIZE + TP_HEADER_SIZE;
        if data.len() < min_size {
            return Err(TransportError::TpHeaderTooShort {
                expected: min_size,
                actual: data.len(),
            });
        }

        let header = SomeIpHeader::from_bytes(&data[..HEADER_SIZE])?;
        let tp_header = TpHeader::from_bytes(&data[HEADER_SIZE..HEADER_SIZE + TP_HEADER_SIZE])?;

        let payload_start = HEADER_SIZE + TP_HEADER_SIZE;
        let payload = Bytes::copy_from_slice(&data[payload_start..]);

        Ok(Self {
            header,
            tp_header,
            payload,
        })
    }

    /// Serialize the segment to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + TP_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.tp_header.to_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Get the byte offset of this segment in the original message.
    pub fn byte_offset(&self) -> usize {
        self.tp_header.byte_offset()
    }

    /// Check if this is the last segment.
    pub fn is_last(&self) -> bool {
        !self.tp_header.more
    }
}

/// Configuration for a [`TpSegmenter`].
#[derive(Debug, Clone)]
pub struct TpSegmenterConfig {
    /// Maximum segment length as encoded in the length field: the TP
    /// header plus the segment payload.
    pub max_segment_length: usize,
    /// Delay between consecutive bursts. Zero means "send everything in
    /// one burst, synchronously, from `segment()`".
    pub separation_time: Duration,
    /// Number of segments per burst once paced. Clamped to at least 1.
    pub burst_size: usize,
}

impl Default for TpSegmenterConfig {
    fn default() -> Self {
        Self {
            max_segment_length: MAX_TP_SEGMENT_LENGTH,
            separation_time: Duration::ZERO,
            burst_size: 1,
        }
    }
}

/// Compute the 16-byte-aligned segment payload size from a configured
/// `max_segment_length`.
fn effective_segment_length(max_segment_length: usize) -> Result<usize> {
    if !(MIN_TP_SEGMENT_LENGTH..=MAX_TP_SEGMENT_LENGTH).contains(&max_segment_length) {
        return Err(TransportError::InvalidSegmentParams {
            reason: "max_segment_length out of bounds",
        });
    }
    let raw = max_segment_length - TP_HEADER_SIZE;
    let aligned = raw & !0xF;
    if aligned == 0 {
        return Err(TransportError::InvalidSegmentParams {
            reason: "max_segment_length leaves no aligned payload",
        });
    }
    Ok(aligned)
}

/// Split an oversize message into TP segments of the given payload size.
fn build_segments(message: &SomeIpMessage, effective_len: usize) -> Vec<TpSegment> {
    let payload = &message.payload;
    let mut segments = Vec::with_capacity(payload.len().div_ceil(effective_len));
    let mut offset: usize = 0;

    while offset < payload.len() {
        let remaining = payload.len() - offset;
        let segment_size = remaining.min(effective_len);
        let is_last = offset + segment_size >= payload.len();

        let tp_header = TpHeader::from_byte_offset(offset, !is_last);

        let mut header = message.header.clone();
        header.message_type = message.header.message_type.to_tp();
        header.length = 8 + TP_HEADER_SIZE as u32 + segment_size as u32;

        let segment_payload = payload.slice(offset..offset + segment_size);
        segments.push(TpSegment::new(header, tp_header, segment_payload));

        offset += segment_size;
    }

    segments
}

/// Scale pacing parameters so the timer period never drops below the 1 ms
/// floor, preserving the requested segment rate by scaling up the burst
/// size instead.
fn normalize_pacing(burst_size: usize, separation_time: Duration) -> (usize, Duration) {
    let burst_size = burst_size.max(1);
    if separation_time.is_zero() {
        (burst_size, Duration::ZERO)
    } else if separation_time < Duration::from_millis(1) {
        let floor = Duration::from_millis(1).as_nanos() as f64;
        let requested = separation_time.as_nanos() as f64;
        let scaled = (burst_size as f64 * floor / requested).ceil() as usize;
        (scaled.max(burst_size), Duration::from_millis(1))
    } else {
        (burst_size, separation_time)
    }
}

/// Outcome of one `tick()` of an in-flight segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// More bursts remain; schedule another tick after the pacing period.
    Continue,
    /// The message has been fully emitted.
    Done,
    /// The send callback reported failure; the message was abandoned.
    Failed,
    /// There was no in-flight segmentation to advance.
    Idle,
}

#[derive(Debug)]
struct SegmenterState {
    header: SomeIpHeader,
    segments: Vec<TpSegment>,
    next_index: usize,
    burst_size: usize,
    period: Duration,
}

/// Splits one oversize SOME/IP message into a sequence of TP segments and
/// drives their emission through a caller-supplied send callback, with
/// configurable pacing.
///
/// Exposes an explicit `tick()` entry point rather than owning a timer
/// itself, so it has no built-in dependency on any particular reactor.
/// `AsyncTpSegmenter` drives the same state machine from a
/// `tokio::time::interval` when the `tokio` feature is enabled.
#[derive(Debug, Default)]
pub struct TpSegmenter {
    state: Option<SegmenterState>,
}

impl TpSegmenter {
    /// Create a new, idle segmenter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a segmentation is currently in flight.
    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    /// The pacing period to wait between calls to `tick()`, if a
    /// segmentation is in flight.
    pub fn next_tick_delay(&self) -> Option<Duration> {
        self.state.as_ref().map(|s| s.period)
    }

    /// Begin segmenting `msg` using `config`, emitting the first burst (or,
    /// if `separation_time` is zero, every segment) synchronously through
    /// `send`.
    ///
    /// Any previously in-flight segmentation is replaced and a warning is
    /// logged naming the abandoned flow and how many segments of it had
    /// already been sent.
    pub fn segment(
        &mut self,
        msg: &SomeIpMessage,
        config: &TpSegmenterConfig,
        send: &mut dyn FnMut(&[TpSegment]) -> bool,
    ) -> Result<()> {
        if let Some(prev) = &self.state {
            tracing::warn!(
                service = %prev.header.service_id,
                method = %prev.header.method_id,
                session = %prev.header.session_id,
                sent = prev.next_index,
                total = prev.segments.len(),
                "replacing in-flight TP segmentation with a new message"
            );
        }

        let effective_len = match effective_segment_length(config.max_segment_length) {
            Ok(len) => len,
            Err(e) => {
                self.state = None;
                return Err(e);
            }
        };
        if msg.payload.len() <= effective_len {
            self.state = None;
            return Err(TransportError::InvalidSegmentParams {
                reason: "message fits in a single segment; segmentation is not required",
            });
        }

        let segments = build_segments(msg, effective_len);
        let (burst_size, period) = normalize_pacing(config.burst_size, config.separation_time);

        if period.is_zero() {
            self.state = None;
            if !send(&segments) {
                tracing::warn!(
                    service = %msg.header.service_id,
                    method = %msg.header.method_id,
                    session = %msg.header.session_id,
                    sent = 0usize,
                    "TP segment send callback failed; abandoning message"
                );
            }
            return Ok(());
        }

        self.state = Some(SegmenterState {
            header: msg.header.clone(),
            segments,
            next_index: 0,
            burst_size,
            period,
        });
        self.emit_burst(send);
        Ok(())
    }

    /// Advance an in-flight segmentation by one burst. Call this from a
    /// timer callback at `next_tick_delay()` intervals.
    pub fn tick(&mut self, send: &mut dyn FnMut(&[TpSegment]) -> bool) -> TickOutcome {
        if self.state.is_none() {
            return TickOutcome::Idle;
        }
        self.emit_burst(send)
    }

    fn emit_burst(&mut self, send: &mut dyn FnMut(&[TpSegment]) -> bool) -> TickOutcome {
        let Some(state) = self.state.as_mut() else {
            return TickOutcome::Idle;
        };

        let end = (state.next_index + state.burst_size).min(state.segments.len());
        let burst = &state.segments[state.next_index..end];

        if !send(burst) {
            tracing::warn!(
                service = %state.header.service_id,
                method = %state.header.method_id,
                session = %state.header.session_id,
                sent = state.next_index,
                total = state.segments.len(),
                "TP segment send callback failed; abandoning message"
            );
            self.state = None;
            return TickOutcome::Failed;
        }

        state.next_index = end;
        if state.next_index >= state.segments.len() {
            self.state = None;
            TickOutcome::Done
        } else {
            TickOutcome::Continue
        }
    }
}

/// Check if a message needs TP segmentation under the given configuration.
pub fn needs_segmentation(message: &SomeIpMessage, config: &TpSegmenterConfig) -> bool {
    match effective_segment_length(config.max_segment_length) {
        Ok(len) => message.payload.len() > len,
        Err(_) => false,
    }
}
