//! Signed envelopes carrying events between bots.
//!
//! Wire shape:
//!
//! ```json
//! { "payload": "<xml-escaped serialized event>", "hashkey": "...", "digest": "<hex>" }
//! ```
//!
//! `digest` is the hex HMAC-SHA512 of the *unescaped* payload keyed by
//! `hashkey`. A mismatch is a hard [`ChatError::NoProperDigest`].

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use super::event::Event;
use crate::error::{ChatError, ChatResult};

type HmacSha512 = Hmac<Sha512>;

/// A remote event envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEnvelope {
    pub payload: String,
    pub hashkey: String,
    pub digest: String,
}

impl RemoteEnvelope {
    /// Serializes and signs `event`.
    pub fn seal(event: &Event, hashkey: impl Into<String>) -> ChatResult<Self> {
        let json = event
            .to_json()
            .map_err(|e| ChatError::InvalidEnvelope(e.to_string()))?;
        Self::seal_text(&json, hashkey)
    }

    /// Signs an already serialized payload.
    pub fn seal_text(json: &str, hashkey: impl Into<String>) -> ChatResult<Self> {
        let hashkey = hashkey.into();
        let digest = sign(&hashkey, json)?;
        Ok(Self {
            payload: xml_escape(json),
            hashkey,
            digest,
        })
    }

    /// Parses an envelope from event text.
    pub fn parse(txt: &str) -> ChatResult<Self> {
        serde_json::from_str(txt).map_err(|e| ChatError::InvalidEnvelope(e.to_string()))
    }

    pub fn to_json(&self) -> ChatResult<String> {
        serde_json::to_string(self).map_err(|e| ChatError::InvalidEnvelope(e.to_string()))
    }

    /// Checks the digest in constant time.
    pub fn verify(&self) -> ChatResult<()> {
        let expected = hex::decode(self.digest.trim()).map_err(|_| ChatError::NoProperDigest)?;
        let mut mac = HmacSha512::new_from_slice(self.hashkey.as_bytes())
            .map_err(|e| ChatError::InvalidEnvelope(e.to_string()))?;
        mac.update(xml_unescape(&self.payload).as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| ChatError::NoProperDigest)
    }

    /// Verifies the envelope and decodes the inner event.
    ///
    /// A correctly signed but blank payload carries no event and fails with
    /// [`ChatError::NoEventProvided`].
    pub fn open(&self) -> ChatResult<Event> {
        self.verify()?;
        let json = xml_unescape(&self.payload);
        if json.trim().is_empty() {
            return Err(ChatError::NoEventProvided);
        }
        Event::from_json(&json).map_err(|e| ChatError::InvalidEnvelope(e.to_string()))
    }
}

fn sign(hashkey: &str, payload: &str) -> ChatResult<String> {
    let mut mac = HmacSha512::new_from_slice(hashkey.as_bytes())
        .map_err(|e| ChatError::InvalidEnvelope(e.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Escapes the five XML special characters.
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Reverses [`xml_escape`]. Unknown entities are kept verbatim.
pub fn xml_unescape(s: &str) -> String {
    const ENTITIES: [(&str, char); 5] = [
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&apos;", '\''),
    ];

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, c)) => {
                out.push(*c);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
