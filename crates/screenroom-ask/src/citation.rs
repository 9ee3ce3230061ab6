use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::source::SourceRecord;

/// Sentinel opening a citation placeholder in render text.
pub const CITE_OPEN: char = '\u{E000}';
/// Sentinel closing a citation placeholder in render text.
pub const CITE_CLOSE: char = '\u{E001}';

/// Delimiter for a trailing source block appended by the answer generator.
const SOURCES_BLOCK_DELIMITER: &str = "\n\nSources:";

/// Inline reference markers: numeric (`[3]`, 1-based index into the source
/// list) or explicit-id (`[c_abc]`, `[S2]`).
static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?:(\d+)|((?:c_|S)[A-Za-z0-9_-]+))\]").expect("marker pattern compiles")
});

/// A display-ready citation derived from a [`SourceRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Stable citation id: the record's explicit id or `video_id@timestamp`.
    pub id: String,
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub title: String,
    /// Transcript excerpt text.
    pub text: String,
    /// Start offset in seconds.
    pub start_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_seconds: Option<f64>,
    /// Formatted start offset (`M:SS`, or `H:MM:SS` past the first hour).
    pub start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// 1-based number shown to the user, ordered by first textual reference.
    pub display_number: usize,
    /// False for sources never referenced by a marker in the answer text.
    pub cited: bool,
}

impl Citation {
    fn from_record(record: &SourceRecord, display_number: usize, cited: bool) -> Self {
        Self {
            id: record.source_id(),
            video_id: record.video_id.clone(),
            playback_id: record.playback_id.clone(),
            speaker: record.speaker.clone(),
            title: record.title.clone(),
            text: record.text.clone(),
            start_seconds: record.timestamp,
            end_seconds: record.timestamp_end,
            start: format_timestamp(record.timestamp),
            end: record.timestamp_end.map(format_timestamp),
            display_number,
            cited,
        }
    }
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciled {
    /// Citations ordered by display number.
    pub citations: Vec<Citation>,
    /// Display number for every citation id numbered so far, including ids
    /// carried over from the seed.
    pub numbers: HashMap<String, usize>,
    /// Answer text with resolved markers replaced by placeholder tokens and
    /// any trailing source block stripped.
    pub render_text: String,
}

/// One piece of parsed render text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderSegment<'a> {
    /// A literal text run.
    Text(&'a str),
    /// A citation chip.
    Citation {
        display_number: usize,
        citation_id: &'a str,
    },
}

/// Reconciles inline reference markers in `text` against `sources`.
///
/// Display numbers are assigned 1..N by order of first textual reference;
/// sources never referenced are appended after the referenced ones, in list
/// order, with `cited: false`. Seeding `numbers` with the previous result's
/// map keeps every previously assigned number stable when the source list is
/// replaced or the text grows; only newly appearing markers and sources
/// receive new numbers.
pub fn reconcile(
    text: &str,
    sources: &[SourceRecord],
    numbers: Option<&HashMap<String, usize>>,
) -> Reconciled {
    let body = strip_sources_block(text);
    let mut numbers = numbers.cloned().unwrap_or_default();
    let mut next = numbers.values().copied().max().unwrap_or(0) + 1;

    // First pass: number resolved markers in first-occurrence order.
    let mut referenced: Vec<String> = Vec::new();
    for captures in MARKER.captures_iter(body) {
        let Some(record) = resolve_marker(&captures, sources) else {
            continue;
        };
        let citation_id = record.source_id();
        if !numbers.contains_key(&citation_id) {
            numbers.insert(citation_id.clone(), next);
            next += 1;
        }
        if !referenced.contains(&citation_id) {
            referenced.push(citation_id);
        }
    }

    // Second pass: replace resolved markers with placeholder tokens;
    // unresolved markers stay literal.
    let mut render_text = String::with_capacity(body.len());
    let mut cursor = 0;
    for captures in MARKER.captures_iter(body) {
        let matched = captures.get(0).expect("match always has a full capture");
        render_text.push_str(&body[cursor..matched.start()]);
        match resolve_marker(&captures, sources) {
            Some(record) => {
                let citation_id = record.source_id();
                let display_number = numbers[&citation_id];
                render_text.push_str(&citation_token(display_number, &citation_id));
            }
            None => render_text.push_str(matched.as_str()),
        }
        cursor = matched.end();
    }
    render_text.push_str(&body[cursor..]);

    // Referenced citations first (by display number), then the remaining
    // sources in list order.
    let mut citations: Vec<Citation> = Vec::with_capacity(sources.len());
    let mut seen: Vec<String> = Vec::new();
    for citation_id in &referenced {
        let Some(record) = sources
            .iter()
            .find(|record| &record.source_id() == citation_id)
        else {
            continue;
        };
        citations.push(Citation::from_record(record, numbers[citation_id], true));
        seen.push(citation_id.clone());
    }
    for record in sources {
        let citation_id = record.source_id();
        if seen.contains(&citation_id) {
            continue;
        }
        let display_number = match numbers.get(&citation_id) {
            Some(number) => *number,
            None => {
                numbers.insert(citation_id.clone(), next);
                next += 1;
                numbers[&citation_id]
            }
        };
        citations.push(Citation::from_record(record, display_number, false));
        seen.push(citation_id);
    }

    Reconciled {
        citations,
        numbers,
        render_text,
    }
}

fn resolve_marker<'s>(
    captures: &regex::Captures<'_>,
    sources: &'s [SourceRecord],
) -> Option<&'s SourceRecord> {
    if let Some(numeric) = captures.get(1) {
        let number: usize = numeric.as_str().parse().ok()?;
        return sources.get(number.checked_sub(1)?);
    }
    let id = captures.get(2)?.as_str();
    sources
        .iter()
        .find(|record| record.id.as_deref() == Some(id))
}

fn strip_sources_block(text: &str) -> &str {
    match text.rfind(SOURCES_BLOCK_DELIMITER) {
        Some(index) => &text[..index],
        None => text,
    }
}

/// Builds the placeholder token a resolved marker is replaced with.
pub fn citation_token(display_number: usize, citation_id: &str) -> String {
    format!("{CITE_OPEN}{display_number}:{citation_id}{CITE_CLOSE}")
}

/// Splits render text into literal runs and citation chips.
pub fn render_segments(render_text: &str) -> Vec<RenderSegment<'_>> {
    let mut segments = Vec::new();
    let mut rest = render_text;
    while let Some(open) = rest.find(CITE_OPEN) {
        let Some(close) = rest[open..].find(CITE_CLOSE).map(|i| open + i) else {
            break;
        };
        if open > 0 {
            segments.push(RenderSegment::Text(&rest[..open]));
        }
        let token = &rest[open + CITE_OPEN.len_utf8()..close];
        if let Some((number, citation_id)) = token.split_once(':')
            && let Ok(display_number) = number.parse()
        {
            segments.push(RenderSegment::Citation {
                display_number,
                citation_id,
            });
        }
        rest = &rest[close + CITE_CLOSE.len_utf8()..];
    }
    if !rest.is_empty() {
        segments.push(RenderSegment::Text(rest));
    }
    segments
}

/// Formats a second offset as `M:SS`, or `H:MM:SS` past the first hour.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: Option<&str>, video_id: &str, timestamp: f64) -> SourceRecord {
        SourceRecord {
            id: id.map(str::to_string),
            video_id: video_id.to_string(),
            title: format!("Video {video_id}"),
            timestamp,
            timestamp_end: Some(timestamp + 30.0),
            text: "excerpt".to_string(),
            playback_id: None,
            speaker: None,
            cited: None,
        }
    }

    #[test]
    fn numbers_follow_first_occurrence_order_not_source_order() {
        let sources = vec![
            source(None, "v1", 10.0),
            source(None, "v2", 20.0),
            source(None, "v3", 30.0),
        ];
        let result = reconcile("See [3] before [1].", &sources, None);
        assert_eq!(result.numbers[&"v3@30".to_string()], 1);
        assert_eq!(result.numbers[&"v1@10".to_string()], 2);
        let cited: Vec<_> = result
            .citations
            .iter()
            .map(|c| (c.display_number, c.cited))
            .collect();
        assert_eq!(cited, vec![(1, true), (2, true), (3, false)]);
        assert_eq!(result.citations[2].id, "v2@20");
    }

    #[test]
    fn duplicate_markers_collapse_to_one_citation() {
        let sources = vec![source(None, "v1", 0.0), source(None, "v2", 0.0)];
        let result = reconcile("A [1] and B [2] and A again [1]", &sources, None);
        assert_eq!(result.citations.len(), 2);
        assert_eq!(result.numbers[&"v1@0".to_string()], 1);
        assert_eq!(result.numbers[&"v2@0".to_string()], 2);
        assert_eq!(
            result.render_text,
            format!(
                "A {} and B {} and A again {}",
                citation_token(1, "v1@0"),
                citation_token(2, "v2@0"),
                citation_token(1, "v1@0"),
            )
        );
    }

    #[test]
    fn explicit_id_markers_resolve_by_source_id() {
        let sources = vec![source(Some("c_abc"), "v1", 5.0), source(Some("S2"), "v2", 8.0)];
        let result = reconcile("First [S2], then [c_abc].", &sources, None);
        assert_eq!(result.numbers[&"S2".to_string()], 1);
        assert_eq!(result.numbers[&"c_abc".to_string()], 2);
        assert!(result.citations.iter().all(|c| c.cited));
    }

    #[test]
    fn out_of_range_and_unknown_markers_stay_literal() {
        let sources = vec![source(None, "v1", 0.0)];
        let result = reconcile("Good [1], bad [7], odd [c_missing].", &sources, None);
        assert!(result.render_text.contains("[7]"));
        assert!(result.render_text.contains("[c_missing]"));
        assert!(!result.render_text.contains("[1]"));
        assert_eq!(result.citations.len(), 1);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let sources = vec![source(None, "v1", 0.0), source(None, "v2", 1.0)];
        let first = reconcile("Cite [2] and [1].", &sources, None);
        let second = reconcile("Cite [2] and [1].", &sources, None);
        assert_eq!(first, second);
    }

    #[test]
    fn seeded_numbers_survive_source_list_growth() {
        let initial = vec![source(None, "v1", 0.0), source(None, "v2", 1.0)];
        let first = reconcile("Cite [2] then [1].", &initial, None);
        assert_eq!(first.numbers[&"v2@1".to_string()], 1);
        assert_eq!(first.numbers[&"v1@0".to_string()], 2);

        let mut grown = initial.clone();
        grown.push(source(None, "v3", 2.0));
        let second = reconcile("Cite [2] then [1]. Also [3].", &grown, Some(&first.numbers));
        for (id, number) in &first.numbers {
            assert_eq!(second.numbers[id], *number, "number for {id} changed");
        }
        assert_eq!(second.numbers[&"v3@2".to_string()], 3);
    }

    #[test]
    fn unreferenced_sources_are_appended_uncited() {
        let sources = vec![
            source(None, "v1", 0.0),
            source(None, "v2", 1.0),
            source(None, "v3", 2.0),
        ];
        let result = reconcile("Only [2] is cited.", &sources, None);
        assert_eq!(result.citations[0].id, "v2@1");
        assert!(result.citations[0].cited);
        assert_eq!(result.citations[0].display_number, 1);
        assert_eq!(result.citations[1].id, "v1@0");
        assert!(!result.citations[1].cited);
        assert_eq!(result.citations[1].display_number, 2);
        assert_eq!(result.citations[2].id, "v3@2");
        assert_eq!(result.citations[2].display_number, 3);
    }

    #[test]
    fn trailing_sources_block_is_stripped_before_reconciliation() {
        let sources = vec![source(None, "v1", 0.0)];
        let text = "An answer [1].\n\nSources:\n1. Video v1";
        let result = reconcile(text, &sources, None);
        assert!(!result.render_text.contains("Sources:"));
        assert_eq!(result.citations.len(), 1);
        assert_eq!(
            result.render_text,
            format!("An answer {}.", citation_token(1, "v1@0"))
        );
    }

    #[test]
    fn render_segments_round_trip_tokens() {
        let text = format!("Start {} middle {} end", citation_token(1, "v1@0"), citation_token(2, "c_x"));
        let segments = render_segments(&text);
        assert_eq!(
            segments,
            vec![
                RenderSegment::Text("Start "),
                RenderSegment::Citation {
                    display_number: 1,
                    citation_id: "v1@0"
                },
                RenderSegment::Text(" middle "),
                RenderSegment::Citation {
                    display_number: 2,
                    citation_id: "c_x"
                },
                RenderSegment::Text(" end"),
            ]
        );
    }

    #[test]
    fn timestamps_format_like_a_player_clock() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(65.4), "1:05");
        assert_eq!(format_timestamp(3725.0), "1:02:05");
    }
}
