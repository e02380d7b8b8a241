//! Frame normalization.
//!
//! Every frame delivered by a push stream becomes exactly one [`Event`]:
//! the decoded JSON value when the frame parses, the raw text otherwise.
//! [`normalize`] never fails and never drops a frame.

use std::fmt;

use serde::Serialize;

/// One discrete message as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// The immutable, normalized form of one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    /// A frame that decoded as JSON (e.g. a dashboard summary or a
    /// structured log record).
    Structured(serde_json::Value),
    /// A frame that did not decode (e.g. one plain log line).
    Opaque(String),
}

impl Event {
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Opaque(_) => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&str> {
        match self {
            Self::Structured(_) => None,
            Self::Opaque(text) => Some(text),
        }
    }

    /// Decode a structured event into a typed payload.
    ///
    /// Returns `None` for opaque events and for structured events whose
    /// shape does not match `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.as_structured()
            .and_then(|value| T::deserialize(value).ok())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(value) => write!(f, "{value}"),
            Self::Opaque(text) => f.write_str(text),
        }
    }
}

/// Convert one raw frame into an [`Event`].
pub fn normalize(frame: Frame) -> Event {
    match frame {
        Frame::Text(text) => match serde_json::from_str(&text) {
            Ok(value) => Event::Structured(value),
            Err(_) => Event::Opaque(text),
        },
        Frame::Binary(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => Event::Structured(value),
            Err(_) => Event::Opaque(String::from_utf8_lossy(&bytes).into_owned()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_object_is_structured() {
        let event = normalize(Frame::Text(r#"{"level":"info","msg":"line2"}"#.into()));
        assert_eq!(event, Event::Structured(json!({"level": "info", "msg": "line2"})));
    }

    #[test]
    fn plain_text_is_opaque_and_unchanged() {
        let event = normalize(Frame::Text("Task Pending...".into()));
        assert_eq!(event, Event::Opaque("Task Pending...".into()));
    }

    #[test]
    fn truncated_json_falls_back_to_text() {
        let raw = r#"{"level":"info","msg":"#;
        assert_eq!(normalize(Frame::Text(raw.into())), Event::Opaque(raw.into()));
    }

    #[test]
    fn empty_frame_is_kept() {
        assert_eq!(normalize(Frame::Text(String::new())), Event::Opaque(String::new()));
    }

    #[test]
    fn json_scalars_are_structured() {
        assert_eq!(normalize(Frame::Text("42".into())), Event::Structured(json!(42)));
        assert_eq!(
            normalize(Frame::Text(r#""quoted""#.into())),
            Event::Structured(json!("quoted"))
        );
    }

    #[test]
    fn binary_json_is_structured() {
        let event = normalize(Frame::Binary(br#"{"total_jobs":1}"#.to_vec()));
        assert_eq!(event, Event::Structured(json!({"total_jobs": 1})));
    }

    #[test]
    fn invalid_utf8_binary_is_lossy_text() {
        let event = normalize(Frame::Binary(vec![b'o', b'k', 0xff]));
        assert_eq!(event, Event::Opaque("ok\u{fffd}".into()));
    }

    #[test]
    fn decode_typed_payload() {
        #[derive(serde::Deserialize, PartialEq, Debug)]
        struct Line {
            msg: String,
        }
        let event = normalize(Frame::Text(r#"{"msg":"hi"}"#.into()));
        assert_eq!(event.decode::<Line>(), Some(Line { msg: "hi".into() }));
        assert_eq!(Event::Opaque("hi".into()).decode::<Line>(), None);
    }

    #[test]
    fn display_renders_both_variants() {
        assert_eq!(Event::Opaque("line1".into()).to_string(), "line1");
        assert_eq!(Event::Structured(json!({"a": 1})).to_string(), r#"{"a":1}"#);
    }
}
