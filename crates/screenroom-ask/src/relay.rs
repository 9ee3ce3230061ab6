use crate::wire::UpstreamEvent;

/// Re-emits decoded answer events as the portal's public SSE frames.
///
/// Field names and source shapes are normalized by the wire model before
/// serialization, the legacy `answer` terminal is re-framed as
/// `message_complete`, and exactly one `[DONE]` frame terminates the stream
/// even when the upstream never sent one.
#[derive(Debug, Default)]
pub struct SseRelay {
    wrote_done: bool,
}

impl SseRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames one decoded event for the browser. Returns `None` for events
    /// that carry nothing downstream (unknown events, anything after the
    /// terminal marker).
    pub fn frame(&mut self, event: &UpstreamEvent) -> Option<String> {
        if self.wrote_done {
            return None;
        }
        match event {
            UpstreamEvent::Done => Some(self.done_frame()),
            UpstreamEvent::Unknown => None,
            event => {
                let normalized = event.clone().normalized();
                let json = serde_json::to_string(&normalized).ok()?;
                Some(format!("data: {json}\n\n"))
            }
        }
    }

    /// Ends the downstream stream, emitting the final `[DONE]` frame if it
    /// has not been sent yet.
    pub fn finish(&mut self) -> Option<String> {
        if self.wrote_done {
            return None;
        }
        Some(self.done_frame())
    }

    fn done_frame(&mut self) -> String {
        self.wrote_done = true;
        "data: [DONE]\n\n".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceRecord;

    #[test]
    fn frames_are_public_shape_sse_records() {
        let mut relay = SseRelay::new();
        let frame = relay
            .frame(&UpstreamEvent::TextDelta {
                delta: "Hello".into(),
            })
            .expect("frame");
        assert_eq!(frame, "data: {\"type\":\"text_delta\",\"delta\":\"Hello\"}\n\n");
    }

    #[test]
    fn source_records_serialize_with_normalized_field_names() {
        let record: SourceRecord = serde_json::from_str(
            r#"{"videoId":"v1","title":"T","start":9.0,"excerpt":"e","playbackId":"p"}"#,
        )
        .expect("parse");
        let mut relay = SseRelay::new();
        let frame = relay
            .frame(&UpstreamEvent::Sources {
                sources: vec![record],
            })
            .expect("frame");
        assert!(frame.contains("\"video_id\":\"v1\""));
        assert!(frame.contains("\"timestamp\":9.0"));
        assert!(frame.contains("\"playback_id\":\"p\""));
        assert!(!frame.contains("videoId"));
    }

    #[test]
    fn legacy_answer_is_reframed_as_message_complete() {
        let mut relay = SseRelay::new();
        let frame = relay
            .frame(&UpstreamEvent::Answer {
                content: Some("Final.".into()),
                citations: None,
            })
            .expect("frame");
        assert!(frame.contains("\"type\":\"message_complete\""));
    }

    #[test]
    fn exactly_one_done_frame_is_emitted() {
        let mut relay = SseRelay::new();
        assert_eq!(relay.frame(&UpstreamEvent::Done), Some("data: [DONE]\n\n".into()));
        assert_eq!(relay.frame(&UpstreamEvent::Done), None);
        assert_eq!(relay.finish(), None);

        // A stream that never saw an upstream DONE still terminates with one.
        let mut relay = SseRelay::new();
        relay.frame(&UpstreamEvent::TextDelta { delta: "x".into() });
        assert_eq!(relay.finish(), Some("data: [DONE]\n\n".into()));
        assert_eq!(relay.finish(), None);
    }

    #[test]
    fn nothing_is_framed_after_the_terminal_marker() {
        let mut relay = SseRelay::new();
        relay.frame(&UpstreamEvent::Done);
        assert_eq!(
            relay.frame(&UpstreamEvent::TextDelta { delta: "late".into() }),
            None
        );
    }
}
