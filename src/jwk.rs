//! JWK <-> PEM conversion for RSA public keys.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine as _};
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::VerifyError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks { pub keys: Vec<Jwk> }

/// Converts an RSA JWK into a SPKI (`BEGIN PUBLIC KEY`) PEM.
///
/// Two encoders may produce different PEM text for the same key; what is
/// preserved is the modulus and exponent, not the bytes.
pub fn jwk_to_pem(jwk: &Jwk) -> Result<String, VerifyError> {
    let key = jwk_to_public_key(jwk)?;
    key.to_public_key_pem(LineEnding::LF).map_err(|e| VerifyError::KeyFormat(e.to_string()))
}

pub(crate) fn jwk_to_public_key(jwk: &Jwk) -> Result<RsaPublicKey, VerifyError> {
    if jwk.kty != "RSA" {
        return Err(VerifyError::KeyFormat(format!("unsupported kty {:?}", jwk.kty)));
    }
    let n = component(jwk.n.as_deref(), "n")?;
    let e = component(jwk.e.as_deref(), "e")?;
    RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
        .map_err(|err| VerifyError::KeyFormat(err.to_string()))
}

fn component(value: Option<&str>, name: &str) -> Result<Vec<u8>, VerifyError> {
    let value = value.ok_or_else(|| VerifyError::KeyFormat(format!("missing '{name}'")))?;
    let bytes = B64URL.decode(value.as_bytes()).map_err(|_| VerifyError::KeyFormat(format!("'{name}' is not base64url")))?;
    if bytes.is_empty() {
        return Err(VerifyError::KeyFormat(format!("'{name}' is empty")));
    }
    Ok(bytes)
}

/// Parses either a SPKI (`BEGIN PUBLIC KEY`) or PKCS#1 (`BEGIN RSA PUBLIC KEY`) PEM.
pub fn decode_public_pem(pem: &str) -> Result<RsaPublicKey, VerifyError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| VerifyError::KeyFormat(e.to_string()))
}

/// PKCS#1 encoding of the same key, for callers that want the other PEM flavour.
pub fn to_pkcs1_pem(pem: &str) -> Result<String, VerifyError> {
    decode_public_pem(pem)?.to_pkcs1_pem(LineEnding::LF).map_err(|e| VerifyError::KeyFormat(e.to_string()))
}

/// Builds an RSA JWK from a public key PEM.
pub fn pem_to_jwk(pem: &str, kid: Option<&str>) -> Result<Jwk, VerifyError> {
    let key = decode_public_pem(pem)?;
    Ok(Jwk {
        kty: "RSA".into(),
        kid: kid.map(str::to_string),
        n: Some(B64URL.encode(key.n().to_bytes_be())),
        e: Some(B64URL.encode(key.e().to_bytes_be())),
        alg: Some(crate::RS256.into()),
        use_: Some("sig".into()),
    })
}
