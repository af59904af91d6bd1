use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Splits a raw SSE byte stream into `data:` payloads.
///
/// Events are separated by a blank line; multi-line `data:` fields are joined
/// with `\n`. Comment lines (`:`) and other fields are ignored.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
}

/// A parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed text into the parser and drain every complete event.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        // Normalize CRLF over the whole buffer so a pair split across reads
        // still collapses; the boundary search then only needs "\n\n".
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();

            let mut event_type = None;
            let mut data_lines = Vec::new();
            for line in block.lines() {
                if let Some(val) = line.strip_prefix("event:") {
                    event_type = Some(val.trim_start().to_string());
                } else if let Some(val) = line.strip_prefix("data:") {
                    data_lines.push(val.strip_prefix(' ').unwrap_or(val).to_string());
                }
            }

            if !data_lines.is_empty() {
                events.push(SseEvent {
                    event_type,
                    data: data_lines.join("\n"),
                });
            }
        }

        events
    }
}

/// A stream of SSE events over a `reqwest` body stream.
pub struct SseStream<S> {
    inner: S,
    parser: SseParser,
    pending: std::collections::VecDeque<SseEvent>,
    // Bytes of a UTF-8 sequence split across chunks.
    carry: Vec<u8>,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            pending: Default::default(),
            carry: Vec::new(),
        }
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = SseEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.carry.extend_from_slice(&bytes);
                    let valid_up_to = match std::str::from_utf8(&this.carry) {
                        Ok(_) => this.carry.len(),
                        Err(e) => e.valid_up_to(),
                    };
                    let rest = this.carry.split_off(valid_up_to);
                    let text = String::from_utf8_lossy(&this.carry).into_owned();
                    this.carry = rest;
                    this.pending.extend(this.parser.feed(&text));
                }
                Poll::Ready(Some(Err(_))) | Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_parser_basic() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: {\"x\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert!(events[0].event_type.is_none());
        assert_eq!(events[0].data, "{\"x\":1}");
    }

    #[test]
    fn test_sse_parser_chunked() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: {\"x\":").is_empty());
        let events = parser.feed("1}\n\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"x\":1}");
        assert_eq!(events[1].data, "[DONE]");
    }

    #[test]
    fn test_sse_parser_crlf_and_comments() {
        let mut parser = SseParser::new();
        let events = parser.feed(": keep-alive\r\n\r\nevent: delta\r\ndata:{\"y\":2}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("delta"));
        assert_eq!(events[0].data, "{\"y\":2}");
    }

    #[test]
    fn test_sse_parser_crlf_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: {\"a\":1}\r\n\r").is_empty());
        let events = parser.feed("\ndata: {\"b\":2}\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert_eq!(events[1].data, "{\"b\":2}");
    }

    #[test]
    fn test_sse_parser_crlf_split_between_cr_and_lf() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: x\r").is_empty());
        assert!(parser.feed("\n\r").is_empty());
        let events = parser.feed("\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[tokio::test]
    async fn test_sse_stream_handles_split_utf8() {
        use futures::StreamExt;

        let payload = "data: héllo\n\n".as_bytes().to_vec();
        // Split inside the two-byte 'é'
        let split = payload.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let chunks: Vec<Result<bytes::Bytes, reqwest::Error>> = vec![
            Ok(bytes::Bytes::copy_from_slice(&payload[..split])),
            Ok(bytes::Bytes::copy_from_slice(&payload[split..])),
        ];
        let events: Vec<SseEvent> = SseStream::new(futures::stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "héllo");
    }
}
