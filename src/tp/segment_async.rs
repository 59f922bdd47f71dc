//! Tokio-driven pacing loop around [`TpSegmenter`].

use tokio::time::{interval, MissedTickBehavior};

use crate::error::Result;
use crate::message::SomeIpMessage;

use super::segment::{TickOutcome, TpSegment, TpSegmenter, TpSegmenterConfig};

/// Drives a [`TpSegmenter`] to completion using a `tokio::time::interval`
/// for pacing, instead of requiring the caller to call `tick()` manually.
#[derive(Debug, Default)]
pub struct AsyncTpSegmenter {
    inner: TpSegmenter,
}

impl AsyncTpSegmenter {
    /// Create a new, idle segmenter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Segment `msg` and drive every burst through `send`, awaiting the
    /// configured pacing interval between bursts. Resolves once the
    /// message has been fully emitted or the send callback reports
    /// failure.
    pub async fn send(
        &mut self,
        msg: &SomeIpMessage,
        config: &TpSegmenterConfig,
        mut send: impl FnMut(&[TpSegment]) -> bool,
    ) -> Result<()> {
        self.inner.segment(msg, config, &mut send)?;

        let Some(period) = self.inner.next_tick_delay() else {
            return Ok(());
        };

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately

        loop {
            ticker.tick().await;
            match self.inner.tick(&mut send) {
                TickOutcome::Continue => continue,
                TickOutcome::Done | TickOutcome::Failed | TickOutcome::Idle => return Ok(()),
            }
        }
    }

    /// Whether a segmentation is currently in flight.
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{MethodId, ServiceId};
    use std::time::Duration;

    #[tokio::test]
    async fn test_async_segmenter_drains_paced_message() {
        let msg = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .payload_vec(vec![0u8; 3000])
            .build();

        let config = TpSegmenterConfig {
            max_segment_length: super::super::segment::MAX_TP_SEGMENT_LENGTH,
            separation_time: Duration::from_millis(1),
            burst_size: 1,
        };

        let mut segmenter = AsyncTpSegmenter::new();
        let mut sent = Vec::new();
        segmenter
            .send(&msg, &config, |burst| {
                sent.extend_from_slice(burst);
                true
            })
            .await
            .unwrap();

        assert_eq!(sent.len(), 3);
        assert!(!segmenter.is_active());
    }

    #[tokio::test]
    async fn test_async_segmenter_single_burst_completes_without_ticking() {
        let msg = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .payload_vec(vec![0u8; 3000])
            .build();

        let config = TpSegmenterConfig::default();

        let mut segmenter = AsyncTpSegmenter::new();
        let mut sent = Vec::new();
        segmenter
            .send(&msg, &config, |burst| {
                sent.extend_from_slice(burst);
                true
            })
            .await
            .unwrap();

        assert_eq!(sent.len(), 3);
        assert!(!segmenter.is_active());
    }
}
