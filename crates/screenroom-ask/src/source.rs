use serde::{Deserialize, Serialize};

/// A transcript source attached to an answer.
///
/// Deserialization accepts the field-name variants the answer service has
/// been observed to emit; serialization always produces the stable public
/// shape (`video_id, title, timestamp, timestamp_end, text, playback_id,
/// speaker`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Explicit source id. Authoritative for identity when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Video the excerpt belongs to.
    #[serde(alias = "videoId")]
    pub video_id: String,
    /// Human-readable video title.
    #[serde(default)]
    pub title: String,
    /// Start offset of the excerpt, in seconds.
    #[serde(default, alias = "start", alias = "start_time", alias = "startTime")]
    pub timestamp: f64,
    /// End offset of the excerpt, in seconds, when known.
    #[serde(
        default,
        alias = "end",
        alias = "end_time",
        alias = "endTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp_end: Option<f64>,
    /// Transcript excerpt text.
    #[serde(default, alias = "excerpt")]
    pub text: String,
    /// Playback identifier for deep links, when distinct from `video_id`.
    #[serde(default, alias = "playbackId", skip_serializing_if = "Option::is_none")]
    pub playback_id: Option<String>,
    /// Speaker label for the excerpt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Cited flag as reported by the service, when it reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cited: Option<bool>,
}

impl SourceRecord {
    /// Stable identity for citation purposes: the explicit id when supplied,
    /// otherwise `(video_id, timestamp)`.
    pub fn source_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}@{}", self.video_id, self.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_upstream_field_aliases() {
        let record: SourceRecord = serde_json::from_str(
            r#"{"videoId":"v1","title":"Town hall","start":125.5,"end":190.0,"excerpt":"we plan to","playbackId":"pb1"}"#,
        )
        .expect("aliases accepted");
        assert_eq!(record.video_id, "v1");
        assert_eq!(record.timestamp, 125.5);
        assert_eq!(record.timestamp_end, Some(190.0));
        assert_eq!(record.text, "we plan to");
        assert_eq!(record.playback_id.as_deref(), Some("pb1"));
    }

    #[test]
    fn serializes_the_stable_public_shape() {
        let record: SourceRecord = serde_json::from_str(
            r#"{"videoId":"v1","title":"Town hall","start":10.0,"excerpt":"hello"}"#,
        )
        .expect("parse");
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["video_id"], "v1");
        assert_eq!(json["timestamp"], 10.0);
        assert_eq!(json["text"], "hello");
        assert!(json.get("videoId").is_none());
        assert!(json.get("timestamp_end").is_none());
    }

    #[test]
    fn explicit_id_is_authoritative_for_identity() {
        let with_id: SourceRecord =
            serde_json::from_str(r#"{"id":"c_abc","video_id":"v1","timestamp":5.0}"#).expect("parse");
        assert_eq!(with_id.source_id(), "c_abc");

        let without_id: SourceRecord =
            serde_json::from_str(r#"{"video_id":"v1","timestamp":5.0}"#).expect("parse");
        assert_eq!(without_id.source_id(), "v1@5");
    }
}
