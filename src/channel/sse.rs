use std::io::BufRead;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    /// Unnamed events and `message` events carry chat messages.
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Incremental `text/event-stream` decoder over any buffered reader.
///
/// Comment lines (`:keep-alive`) and `id:`/`retry:` fields are ignored.
/// An event is dispatched on a blank line; a trailing event without one is
/// dropped, matching browser behaviour when the connection closes.
pub struct SseDecoder<R> {
    reader: R,
    line: String,
}

impl<R: BufRead> SseDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for SseDecoder<R> {
    type Item = std::io::Result<SseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut event: Option<String> = None;
        let mut data: Vec<String> = Vec::new();

        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }

            let line = self.line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if data.is_empty() && event.is_none() {
                    continue;
                }
                return Some(Ok(SseEvent {
                    event: event.take(),
                    data: data.join("\n"),
                }));
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "data" => data.push(value.to_string()),
                "event" => event = Some(value.to_string()),
                _ => {}
            }
        }
    }
}
