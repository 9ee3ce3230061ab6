use tracing::debug;

use crate::wire::UpstreamEvent;

/// Incremental decoder for the answer service's `data: <json>` line
/// protocol.
///
/// A payload may arrive split across reads; the trailing, not yet
/// newline-terminated fragment of each read is buffered and prepended to the
/// next one before re-splitting. One malformed line never aborts the rest of
/// the stream.
#[derive(Default)]
pub(crate) struct SseLineDecoder {
    buf: Vec<u8>,
}

impl SseLineDecoder {
    /// Decodes every complete line in `chunk` (plus any buffered fragment)
    /// into events, in arrival order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<UpstreamEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(index) = self.buf.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=index).collect();
            if let Some(event) = decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Parses any buffered trailing fragment as a final best-effort line.
    pub fn finish(&mut self) -> Vec<UpstreamEvent> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<UpstreamEvent> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim_end_matches('\r'),
        Err(error) => {
            debug!(%error, "skipping non-utf8 answer stream line");
            return None;
        }
    };
    // Only data lines carry payload; event:/id:/retry:, comments, and blank
    // separators are framing.
    let payload = line.strip_prefix("data: ")?;
    if payload == "[DONE]" {
        return Some(UpstreamEvent::Done);
    }
    match serde_json::from_str::<UpstreamEvent>(payload) {
        Ok(UpstreamEvent::Unknown) => {
            debug!("dropping unrecognized answer event");
            None
        }
        Ok(event) => Some(event),
        Err(error) => {
            debug!(%error, "skipping malformed answer stream line");
            None
        }
    }
}
