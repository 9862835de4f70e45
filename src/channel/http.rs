use std::io::BufReader;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::{
    ChatMessage, ConsoleApi, Entity, Identity, InboundStream, OutboundMessage, PollStream,
    SharedCursor, SseDecoder, TransportError,
};
use crate::config::{ConsoleConfig, InboundMode};

/// Messages fetched per poll and when priming the seen set.
pub(super) const POLL_BATCH: usize = 20;

/// [`ConsoleApi`] over HTTP.
///
/// The stream uses its own agent without a global timeout so that an idle
/// subscription is not torn down; every other call is bounded by
/// `console.timeout_secs`. In poll mode the seen-message cursor lives here so
/// it carries over reconnects.
pub struct HttpConsole {
    config: ConsoleConfig,
    identity: Identity,
    calls: ureq::Agent,
    stream: ureq::Agent,
    poll_cursor: SharedCursor,
}

impl HttpConsole {
    pub fn new(config: &ConsoleConfig, identity: Identity) -> Self {
        let calls: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build()
            .into();
        let stream: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(config.timeout()))
            .build()
            .into();
        Self {
            config: config.clone(),
            identity,
            calls,
            stream,
            poll_cursor: SharedCursor::default(),
        }
    }

    fn open_event_stream(&self) -> Result<InboundStream, TransportError> {
        let url = self.config.endpoint(&self.config.stream_path);
        let response = self
            .stream
            .get(&url)
            .header("Accept", "text/event-stream")
            .query("entity_id", &self.identity.id)
            .query("entity_name", &self.identity.name)
            .query("entity_type", "agent")
            .call()?;

        let reader = BufReader::new(response.into_body().into_reader());
        let messages = SseDecoder::new(reader).filter_map(|event| match event {
            Ok(event) if event.is_message() => decode_event(&event.data).map(Ok),
            Ok(event) => {
                debug!(event = ?event.event, "ignoring non-message stream event");
                None
            }
            Err(e) => Some(Err(TransportError::Io(e))),
        });
        Ok(Box::new(messages))
    }

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<serde_json::Value, TransportError> {
        let mut request = self.calls.get(url);
        for (key, value) in query {
            request = request.query(key, value);
        }
        let body = request.call()?.into_body().read_to_string()?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Stream payloads are either a bare message or `{"message": {...}}`.
/// Anything else (presence, typing) is skipped.
fn decode_event(data: &str) -> Option<ChatMessage> {
    #[derive(Deserialize)]
    struct Envelope {
        message: ChatMessage,
    }

    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "skipping undecodable stream event");
            return None;
        }
    };
    if value.get("message").is_some_and(serde_json::Value::is_object) {
        return serde_json::from_value::<Envelope>(value).ok().map(|e| e.message);
    }
    if value.get("content").is_none() && value.get("text").is_none() {
        debug!("skipping stream event without message content");
        return None;
    }
    serde_json::from_value(value).ok()
}

/// `{"messages": [...]}` or a bare array.
fn decode_messages(value: serde_json::Value) -> Result<Vec<ChatMessage>, TransportError> {
    let list = match value {
        serde_json::Value::Object(mut map) => map
            .remove("messages")
            .unwrap_or(serde_json::Value::Array(Vec::new())),
        other => other,
    };
    Ok(serde_json::from_value(list)?)
}

impl ConsoleApi for HttpConsole {
    fn open_stream(&self) -> Result<InboundStream, TransportError> {
        match self.config.mode {
            InboundMode::Stream => self.open_event_stream(),
            InboundMode::Poll => {
                let api = Arc::new(HttpConsole::new(&self.config, self.identity.clone()));
                let stream = PollStream::start(
                    api,
                    self.config.poll_interval(),
                    Arc::clone(&self.poll_cursor),
                )?;
                Ok(Box::new(stream))
            }
        }
    }

    fn post(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let url = self.config.endpoint(&self.config.send_path);
        let body = serde_json::to_string(message)?;
        self.calls
            .post(&url)
            .header("Content-Type", "application/json")
            .send(body.as_str())?;
        Ok(())
    }

    fn online_entities(&self) -> Result<Vec<Entity>, TransportError> {
        #[derive(Deserialize)]
        struct Online {
            #[serde(default)]
            entities: Vec<Entity>,
        }

        let url = self.config.endpoint(&self.config.online_path);
        let online: Online = serde_json::from_value(self.get_json(&url, &[])?)?;
        Ok(online.entities)
    }

    fn recent_messages(&self, limit: usize) -> Result<Vec<ChatMessage>, TransportError> {
        let url = self.config.endpoint(&self.config.messages_path);
        decode_messages(self.get_json(&url, &[("limit", limit.to_string())])?)
    }
}
