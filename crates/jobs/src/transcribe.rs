use std::sync::{Arc, Mutex};

use {
    chrono::{DateTime, Utc},
    dashmap::DashMap,
    serde::{Deserialize, Serialize},
    tokio::sync::broadcast,
    tracing::debug,
};

use crate::error::{Error, Result};

/// Per-subscriber live buffer; a subscriber slower than this lags and
/// skips, without slowing anyone else down.
const SUBSCRIBER_QUEUE: usize = 256;

/// One transcribed span of audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub text: String,
    pub start_time: f32,
    pub end_time: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

struct ChannelState {
    buffer: Vec<TranscriptSegment>,
    closed: bool,
}

struct Channel {
    state: Mutex<ChannelState>,
    live: broadcast::Sender<TranscriptSegment>,
}

/// Multi-producer / multi-consumer segment broadcast, keyed by job id.
///
/// Each subscriber first replays everything buffered so far, then follows
/// live. Producers push through [`publish`](TranscriptionHub::publish);
/// external transcription engines are the producers, this hub is only the
/// fan-out.
#[derive(Default)]
pub struct TranscriptionHub {
    channels: DashMap<String, Arc<Channel>>,
}

impl TranscriptionHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the segment channel for a job. Idempotent.
    pub fn open(&self, job_id: &str) {
        self.channels.entry(job_id.to_string()).or_insert_with(|| {
            debug!(job_id, "transcription channel opened");
            let (live, _) = broadcast::channel(SUBSCRIBER_QUEUE);
            Arc::new(Channel {
                state: Mutex::new(ChannelState {
                    buffer: Vec::new(),
                    closed: false,
                }),
                live,
            })
        });
    }

    /// Push a segment to the buffer and all live subscribers.
    pub fn publish(&self, job_id: &str, segment: TranscriptSegment) -> Result<()> {
        let channel = self
            .channels
            .get(job_id)
            .ok_or_else(|| Error::message(format!("no transcription channel for {job_id}")))?;
        {
            let mut state = channel
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if state.closed {
                return Err(Error::message(format!(
                    "transcription channel for {job_id} is closed"
                )));
            }
            state.buffer.push(segment.clone());
        }
        // No live subscribers is fine; the buffer still replays later.
        let _ = channel.live.send(segment);
        Ok(())
    }

    /// Subscribe: buffered segments replay first, then live delivery in
    /// production order.
    pub fn subscribe(&self, job_id: &str) -> Result<SegmentStream> {
        let channel = self
            .channels
            .get(job_id)
            .ok_or_else(|| Error::message(format!("no transcription channel for {job_id}")))?;
        let state = channel
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(SegmentStream {
            replay: state.buffer.clone().into(),
            live: channel.live.subscribe(),
            closed: state.closed,
        })
    }

    /// Close the channel. Subscribers drain their replay and stop.
    pub fn close(&self, job_id: &str) {
        if let Some(channel) = self.channels.get(job_id) {
            let mut state = channel
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state.closed = true;
            debug!(job_id, segments = state.buffer.len(), "transcription channel closed");
        }
        // Dropping the entry drops the broadcast sender, ending live
        // receivers with Closed.
        self.channels.remove(job_id);
    }
}

/// A subscriber's view: replay, then live.
pub struct SegmentStream {
    replay: std::collections::VecDeque<TranscriptSegment>,
    live: broadcast::Receiver<TranscriptSegment>,
    closed: bool,
}

impl SegmentStream {
    /// Next segment, or `None` once the channel is closed and drained.
    /// A lagged subscriber skips ahead, losing its oldest segments only.
    pub async fn next(&mut self) -> Option<TranscriptSegment> {
        if let Some(segment) = self.replay.pop_front() {
            return Some(segment);
        }
        if self.closed {
            return None;
        }
        loop {
            match self.live.recv().await {
                Ok(segment) => return Some(segment),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "transcription subscriber lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str, at: f32) -> TranscriptSegment {
        TranscriptSegment {
            text: text.into(),
            start_time: at,
            end_time: at + 1.0,
            confidence: Some(0.9),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_replay_then_live() {
        let hub = TranscriptionHub::new();
        hub.open("job-1");
        hub.publish("job-1", segment("one", 0.0)).unwrap();
        hub.publish("job-1", segment("two", 1.0)).unwrap();

        let mut stream = hub.subscribe("job-1").unwrap();
        assert_eq!(stream.next().await.unwrap().text, "one");
        assert_eq!(stream.next().await.unwrap().text, "two");

        hub.publish("job-1", segment("three", 2.0)).unwrap();
        assert_eq!(stream.next().await.unwrap().text, "three");
    }

    #[tokio::test]
    async fn test_each_subscriber_gets_full_replay() {
        let hub = TranscriptionHub::new();
        hub.open("job-1");
        hub.publish("job-1", segment("a", 0.0)).unwrap();

        let mut first = hub.subscribe("job-1").unwrap();
        let mut second = hub.subscribe("job-1").unwrap();
        assert_eq!(first.next().await.unwrap().text, "a");
        assert_eq!(second.next().await.unwrap().text, "a");
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let hub = TranscriptionHub::new();
        hub.open("job-1");
        hub.publish("job-1", segment("last", 0.0)).unwrap();
        let mut stream = hub.subscribe("job-1").unwrap();
        hub.close("job-1");

        // Replay still drains, then the stream ends.
        assert_eq!(stream.next().await.unwrap().text, "last");
        assert!(stream.next().await.is_none());

        // Publishing after close fails.
        assert!(hub.publish("job-1", segment("late", 1.0)).is_err());
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let hub = TranscriptionHub::new();
        hub.open("job-1");
        hub.publish("job-1", segment("kept", 0.0)).unwrap();
        hub.open("job-1");
        let mut stream = hub.subscribe("job-1").unwrap();
        assert_eq!(stream.next().await.unwrap().text, "kept");
    }

    #[test]
    fn test_segment_serialization() {
        let s = segment("hello", 1.5);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains(r#""startTime":1.5"#));
        assert!(json.contains(r#""confidence":0.9"#));
        let none = TranscriptSegment {
            confidence: None,
            ..s
        };
        assert!(!serde_json::to_string(&none).unwrap().contains("confidence"));
    }
}
