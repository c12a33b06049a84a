//! Compact JWS decoding. Nothing here checks authenticity.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::VerifyError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    pub header: Header,
    pub payload: Map<String, Json>,
    pub signature: Vec<u8>,
    /// `header.payload` exactly as it appeared in the token; this is what was signed.
    pub signing_input: String,
}

/// Decodes only the payload. The header must still be a JSON object.
pub fn decode(token: &str) -> Result<Map<String, Json>, VerifyError> {
    let [header, payload, _] = split(token)?;
    json_segment(header, "header")?;
    json_segment(payload, "payload")
}

/// Decodes header, payload and signature.
pub fn decode_complete(token: &str) -> Result<DecodedToken, VerifyError> {
    let [header, payload, signature] = split(token)?;
    let header_json = json_segment(header, "header")?;
    let header: Header = serde_json::from_value(Json::Object(header_json))
        .map_err(|e| VerifyError::MalformedToken(format!("header: {e}")))?;
    let payload_json = json_segment(payload, "payload")?;
    let sig = B64URL.decode(signature.as_bytes())
        .map_err(|_| VerifyError::MalformedToken("signature is not base64url".into()))?;
    Ok(DecodedToken {
        header,
        payload: payload_json,
        signature: sig,
        signing_input: token[..token.len() - signature.len() - 1].to_string(),
    })
}

fn split(token: &str) -> Result<[&str; 3], VerifyError> {
    let parts: Vec<&str> = token.split('.').collect();
    match parts.as_slice() {
        [h, p, s] => Ok([*h, *p, *s]),
        _ => Err(VerifyError::MalformedToken(format!("expected 3 segments, found {}", parts.len()))),
    }
}

fn json_segment(segment: &str, what: &str) -> Result<Map<String, Json>, VerifyError> {
    let bytes = B64URL.decode(segment.as_bytes())
        .map_err(|_| VerifyError::MalformedToken(format!("{what} is not base64url")))?;
    match serde_json::from_slice(&bytes) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(_) => Err(VerifyError::MalformedToken(format!("{what} is not a JSON object"))),
        Err(e) => Err(VerifyError::MalformedToken(format!("{what}: {e}"))),
    }
}
