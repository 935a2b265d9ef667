//! Callback envelope codec.
//!
//! Inbound callbacks are a flat `<xml>` document whose children are named by
//! fixed tags. Decoding collects the raw child text with a pull reader (text
//! is not trimmed, so replies round-trip) and then narrows it into a typed
//! [`InboundEnvelope`], so a tag that is required for the message kind at
//! hand is an error rather than an empty field.

use chrono::Utc;
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;
use serde::Serialize;

use crate::error::EnvelopeError;

const FROM_USER_TAG: &str = "FromUserName";
const TO_USER_TAG: &str = "ToUserName";
const CREATE_TIME_TAG: &str = "CreateTime";
const MSG_TYPE_TAG: &str = "MsgType";
const CONTENT_TAG: &str = "Content";
const EVENT_TAG: &str = "Event";
const EVENT_KEY_TAG: &str = "EventKey";

// ── Typed model ─────────────────────────────────────────────────────────

/// A parsed callback from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    /// Sender id (the follower).
    pub from_user: String,
    /// Recipient id (this official account).
    pub to_user: String,
    /// Platform-side timestamp, seconds since epoch.
    pub created_at: Option<i64>,
    pub message: Message,
}

/// Message payload, discriminated by `MsgType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text { content: String },
    Event(Event),
    /// Any other `MsgType` (image, voice, location, ...).
    Other { kind: String },
}

/// Event payload, discriminated by `Event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Subscribe,
    Unsubscribe,
    /// Menu button click; `key` identifies the button.
    Click { key: String },
    Other { kind: String },
}

impl Message {
    /// The `MsgType` value this message was decoded from.
    pub fn kind(&self) -> &str {
        match self {
            Message::Text { .. } => "text",
            Message::Event(_) => "event",
            Message::Other { kind } => kind,
        }
    }
}

/// A text reply addressed back to the sender of an inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEnvelope {
    pub to_user: String,
    pub from_user: String,
    pub content: String,
}

impl OutboundEnvelope {
    /// Build a reply to `inbound`, swapping sender and recipient.
    pub fn reply_to(inbound: &InboundEnvelope, content: impl Into<String>) -> Self {
        Self {
            to_user: inbound.from_user.clone(),
            from_user: inbound.to_user.clone(),
            content: content.into(),
        }
    }

    /// Serialize with `CreateTime` set to now.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        self.encode_at(Utc::now().timestamp())
    }

    /// Serialize with an explicit `CreateTime`.
    pub fn encode_at(&self, create_time: i64) -> Result<String, EnvelopeError> {
        let wire = WireReply {
            to_user: &self.to_user,
            from_user: &self.from_user,
            create_time,
            msg_type: "text",
            content: &self.content,
        };
        quick_xml::se::to_string(&wire).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }
}

// ── Wire format ─────────────────────────────────────────────────────────

/// Raw text of the known child tags. Text is kept exactly as sent; only
/// the first occurrence of a repeated tag is kept.
#[derive(Debug, Default)]
struct WireEnvelope {
    from_user: Option<String>,
    to_user: Option<String>,
    create_time: Option<String>,
    msg_type: Option<String>,
    content: Option<String>,
    event: Option<String>,
    event_key: Option<String>,
}

const KNOWN_TAGS: [&str; 7] = [
    FROM_USER_TAG,
    TO_USER_TAG,
    CREATE_TIME_TAG,
    MSG_TYPE_TAG,
    CONTENT_TAG,
    EVENT_TAG,
    EVENT_KEY_TAG,
];

impl WireEnvelope {
    /// The known tag called `name`, if any.
    fn known_tag(name: &[u8]) -> Option<&'static str> {
        KNOWN_TAGS.into_iter().find(|tag| tag.as_bytes() == name)
    }

    /// Field for a tag returned by [`Self::known_tag`].
    fn slot(&mut self, tag: &str) -> &mut Option<String> {
        match tag {
            FROM_USER_TAG => &mut self.from_user,
            TO_USER_TAG => &mut self.to_user,
            CREATE_TIME_TAG => &mut self.create_time,
            MSG_TYPE_TAG => &mut self.msg_type,
            CONTENT_TAG => &mut self.content,
            EVENT_TAG => &mut self.event,
            _ => &mut self.event_key,
        }
    }

    /// Walk the document, collecting the text of the root's direct children.
    fn read(body: &str) -> Result<Self, EnvelopeError> {
        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(false);

        let mut wire = WireEnvelope::default();
        let mut depth = 0usize;
        // Known child tag being collected; repeats of a filled tag are skipped.
        let mut capturing: Option<&'static str> = None;
        let mut text = String::new();

        loop {
            match reader.read_event().map_err(syntax)? {
                XmlEvent::Start(start) => {
                    depth += 1;
                    if depth == 2 {
                        capturing = Self::known_tag(start.local_name().as_ref())
                            .filter(|tag| wire.slot(tag).is_none());
                        text.clear();
                    }
                }
                XmlEvent::Empty(empty) if depth == 1 => {
                    if let Some(tag) = Self::known_tag(empty.local_name().as_ref()) {
                        wire.slot(tag).get_or_insert_with(String::new);
                    }
                }
                XmlEvent::Text(chunk) if depth == 2 && capturing.is_some() => {
                    text.push_str(&chunk.unescape().map_err(syntax)?);
                }
                XmlEvent::CData(chunk) if depth == 2 && capturing.is_some() => {
                    let raw =
                        String::from_utf8(chunk.into_inner().into_owned()).map_err(syntax)?;
                    text.push_str(&raw);
                }
                XmlEvent::End(_) => {
                    if depth == 2 {
                        if let Some(tag) = capturing.take() {
                            *wire.slot(tag) = Some(std::mem::take(&mut text));
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                XmlEvent::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(EnvelopeError::Syntax(
                "document ended inside an element".to_string(),
            ));
        }
        Ok(wire)
    }
}

fn syntax(err: impl std::fmt::Display) -> EnvelopeError {
    EnvelopeError::Syntax(err.to_string())
}

/// Field order here is the order tags are written.
#[derive(Serialize)]
#[serde(rename = "xml")]
struct WireReply<'a> {
    #[serde(rename = "ToUserName")]
    to_user: &'a str,
    #[serde(rename = "FromUserName")]
    from_user: &'a str,
    #[serde(rename = "CreateTime")]
    create_time: i64,
    #[serde(rename = "MsgType")]
    msg_type: &'a str,
    #[serde(rename = "Content")]
    content: &'a str,
}

// ── Decoding ────────────────────────────────────────────────────────────

/// Decode a callback body.
pub fn decode(body: &str) -> Result<InboundEnvelope, EnvelopeError> {
    if body.trim().is_empty() {
        return Err(EnvelopeError::Empty);
    }

    let wire = WireEnvelope::read(body)?;

    let from_user = non_empty(wire.from_user, FROM_USER_TAG)?;
    let to_user = non_empty(wire.to_user, TO_USER_TAG)?;
    let msg_type = non_empty(wire.msg_type, MSG_TYPE_TAG)?;

    let created_at = match wire.create_time {
        Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
            EnvelopeError::InvalidField {
                field: CREATE_TIME_TAG,
                value: raw.clone(),
            }
        })?),
        None => None,
    };

    let message = match msg_type.as_str() {
        "text" => Message::Text {
            content: present(wire.content, CONTENT_TAG)?,
        },
        "event" => {
            let event = non_empty(wire.event, EVENT_TAG)?;
            Message::Event(decode_event(event, wire.event_key)?)
        }
        _ => Message::Other { kind: msg_type },
    };

    Ok(InboundEnvelope {
        from_user,
        to_user,
        created_at,
        message,
    })
}

fn decode_event(event: String, key: Option<String>) -> Result<Event, EnvelopeError> {
    // The platform sends `subscribe`/`unsubscribe` in lowercase and `CLICK` in
    // uppercase.
    let event = if event.eq_ignore_ascii_case("subscribe") {
        Event::Subscribe
    } else if event.eq_ignore_ascii_case("unsubscribe") {
        Event::Unsubscribe
    } else if event.eq_ignore_ascii_case("click") {
        Event::Click {
            key: present(key, EVENT_KEY_TAG)?,
        }
    } else {
        Event::Other { kind: event }
    };
    Ok(event)
}

fn present(value: Option<String>, tag: &'static str) -> Result<String, EnvelopeError> {
    value.ok_or(EnvelopeError::MissingField(tag))
}

fn non_empty(value: Option<String>, tag: &'static str) -> Result<String, EnvelopeError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(EnvelopeError::MissingField(tag))
}
