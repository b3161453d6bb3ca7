//! Incremental Server-Sent Events decoding for execution streams.
//!
//! Bytes arrive in arbitrary chunks; complete frames (terminated by a blank
//! line) are parsed as they become available and their `data:` payload is
//! decoded as an [`ExecutionEvent`].

use std::collections::VecDeque;

use futures_util::{Stream, StreamExt, stream};
use trellis_types::ExecutionEvent;

use super::ExecutionError;

/// Longest frame separator (`\r\n\r\n`) minus one: how far back a new
/// chunk can complete a separator that started in earlier bytes.
const SEPARATOR_OVERLAP: usize = 3;

#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a frame end.
    scanned: usize,
}

impl SseDecoder {
    /// Feeds a chunk and returns every event completed by it.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Result<ExecutionEvent, ExecutionError>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut from = self.scanned.saturating_sub(SEPARATOR_OVERLAP);
        while let Some((end, separator_len)) = find_frame_end(&self.buffer, from) {
            let frame: Vec<u8> = self.buffer.drain(..end + separator_len).take(end).collect();
            events.extend(decode_frame(&frame));
            from = 0;
        }
        self.scanned = self.buffer.len();
        events
    }

    /// Flushes a trailing frame that was not terminated by a blank line.
    pub(crate) fn finish(&mut self) -> Vec<Result<ExecutionEvent, ExecutionError>> {
        self.scanned = 0;
        let frame = std::mem::take(&mut self.buffer);
        decode_frame(&frame).into_iter().collect()
    }
}

/// Turns a byte stream into a stream of decoded events. A transport error
/// ends the stream after being yielded.
pub(crate) fn decode_event_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<ExecutionEvent, ExecutionError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ExecutionError> + Send + 'static,
{
    let state = (bytes, SseDecoder::default(), VecDeque::new(), false);
    stream::unfold(state, |(mut bytes, mut decoder, mut ready, mut done)| async move {
        loop {
            if let Some(item) = ready.pop_front() {
                return Some((item, (bytes, decoder, ready, done)));
            }
            if done {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => ready.extend(decoder.push(chunk.as_ref())),
                Some(Err(error)) => {
                    ready.push_back(Err(error.into()));
                    done = true;
                }
                None => {
                    ready.extend(decoder.finish());
                    done = true;
                }
            }
        }
    })
}

/// Position and length of the first frame separator at or after `from`.
fn find_frame_end(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buffer.len()).find_map(|index| {
        let rest = &buffer[index..];
        if rest.starts_with(b"\r\n\r\n") {
            Some((index, 4))
        } else if rest.starts_with(b"\n\n") {
            Some((index, 2))
        } else {
            None
        }
    })
}

fn decode_frame(frame: &[u8]) -> Option<Result<ExecutionEvent, ExecutionError>> {
    let text = String::from_utf8_lossy(frame);
    let data_lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.starts_with(':'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data_lines.is_empty() {
        return None;
    }
    let data = data_lines.join("\n");
    if data.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str::<ExecutionEvent>(&data).map_err(ExecutionError::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frames_split_across_chunks_are_reassembled() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"event_type\":\"run_in").is_empty());
        let events = decoder.push(b"itiated\",\"payload\":{\"run_id\":\"r1\"}}\n\n: keep-alive\n\n");
        assert_eq!(events.len(), 1);
        let event = events.into_iter().next().unwrap().unwrap();
        assert_eq!(event, ExecutionEvent::new("run_initiated", json!({"run_id": "r1"})));
    }

    #[test]
    fn crlf_frames_and_trailing_data_are_decoded() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"event: message\r\ndata: {\"event_type\":\"a\"}\r\n\r\ndata: {\"event_type\":\"b\"}");
        assert_eq!(events.len(), 1);
        let trailing = decoder.finish();
        assert_eq!(trailing.len(), 1);
        assert_eq!(trailing[0].as_ref().unwrap().event_type, "b");
    }

    #[test]
    fn byte_at_a_time_input_only_scans_new_bytes() {
        let input = b"data: {\"event_type\":\"a\"}\r\n\r\n: ping\n\ndata: {\"event_type\":\"b\"}\n\n";
        let mut decoder = SseDecoder::default();
        let mut types = Vec::new();
        for byte in input {
            for event in decoder.push(std::slice::from_ref(byte)) {
                types.push(event.unwrap().event_type);
            }
            assert_eq!(decoder.scanned, decoder.buffer.len());
        }
        assert_eq!(types, ["a", "b"]);
        assert!(decoder.buffer.is_empty());
    }

    #[test]
    fn separators_split_across_chunks_are_found() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"event_type\":\"a\"}\r\n\r").is_empty());
        assert_eq!(decoder.push(b"\n").len(), 1);
        assert!(decoder.push(b"data: {\"event_type\":\"b\"}\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: {\"event_type\":\"c\"}\n\n").len(), 2);
        assert_eq!(find_frame_end(b"ab\n\ncd\n\n", 3), Some((6, 2)));
    }

    #[test]
    fn malformed_json_is_reported_per_frame() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: {oops\n\ndata: {\"event_type\":\"ok\"}\n\n");
        assert!(events[0].is_err());
        assert_eq!(events[1].as_ref().unwrap().event_type, "ok");
    }

    #[tokio::test]
    async fn byte_streams_become_event_streams() {
        let chunks: Vec<Result<Vec<u8>, ExecutionError>> = vec![
            Ok(b"data: {\"event_type\":\"one\"}\n".to_vec()),
            Ok(b"\ndata: {\"event_type\":\"two\"}\n\n".to_vec()),
        ];
        let events: Vec<_> = decode_event_stream(stream::iter(chunks)).collect().await;
        let types: Vec<_> = events.into_iter().map(|event| event.unwrap().event_type).collect();
        assert_eq!(types, ["one", "two"]);
    }
}
