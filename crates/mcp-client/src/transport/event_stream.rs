/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field; `message` when absent.
    pub event: String,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Feed raw body chunks with [`push`](Self::push); complete events come
/// out, a partial trailing event is kept until its blank line arrives.
/// Bytes are only decoded once an event is complete, so a multi-byte
/// character split across chunks survives.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        strip_crlf(&mut self.buffer);

        let mut events = Vec::new();
        while let Some(pos) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush an unterminated final event once the body has ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_block(&String::from_utf8_lossy(&rest))
    }
}

/// Drop every `\r` that directly precedes a `\n`.
fn strip_crlf(buffer: &mut Vec<u8>) {
    if !buffer.contains(&b'\r') {
        return;
    }
    let mut out = Vec::with_capacity(buffer.len());
    for (i, &b) in buffer.iter().enumerate() {
        if b == b'\r' && buffer.get(i + 1) == Some(&b'\n') {
            continue;
        }
        out.push(b);
    }
    *buffer = out;
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event: event.unwrap_or_else(|| "message".into()),
        data: data.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_then_message() {
        let mut parser = EventStreamParser::new();
        let events = parser.push(
            "event: endpoint\ndata: /messages?session_id=abc\n\nevent: message\ndata: {\"id\":1}\n\n".as_bytes(),
        );
        assert_eq!(
            events,
            vec![
                SseEvent { event: "endpoint".into(), data: "/messages?session_id=abc".into() },
                SseEvent { event: "message".into(), data: "{\"id\":1}".into() },
            ]
        );
    }

    #[test]
    fn event_split_across_chunks() {
        let mut parser = EventStreamParser::new();
        assert!(parser.push("data: {\"jsonrpc\":".as_bytes()).is_empty());
        assert!(parser.push("\"2.0\"}\r\n".as_bytes()).is_empty());
        let events = parser.push("\r\n".as_bytes());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "{\"jsonrpc\":\"2.0\"}");
    }

    #[test]
    fn comments_and_dataless_events_are_dropped() {
        let mut parser = EventStreamParser::new();
        assert!(parser.push(": ping\n\nevent: heartbeat\n\n".as_bytes()).is_empty());
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let body = "data: 圆的面积是 201.06\n\n".as_bytes();
        let mut parser = EventStreamParser::new();
        // Byte 8 falls inside the first character.
        assert!(parser.push(&body[..8]).is_empty());
        let events = parser.push(&body[8..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "圆的面积是 201.06");
    }

    #[test]
    fn crlf_split_between_chunks() {
        let mut parser = EventStreamParser::new();
        assert!(parser.push(b"data: x\r").is_empty());
        assert!(parser.push(b"\n\r").is_empty());
        assert_eq!(parser.push(b"\n").len(), 1);
    }

    #[test]
    fn finish_flushes_tail() {
        let mut parser = EventStreamParser::new();
        assert!(parser.push("data: last".as_bytes()).is_empty());
        assert_eq!(parser.finish().map(|e| e.data), Some("last".to_string()));
        assert!(parser.finish().is_none());
    }
}
