use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::fmt;

use crate::{VerifyError, ID_TOKEN_USE};

/// Claims of an ID token. `iss` and `token_use` are always present on a
/// verified token; everything not named here lands in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub token_use: String,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<Aud>,
    #[serde(default, with = "numeric_date")]
    pub exp: Option<f64>,
    #[serde(default, with = "numeric_date")]
    pub nbf: Option<f64>,
    #[serde(default, with = "numeric_date")]
    pub iat: Option<f64>,
    #[serde(default, with = "numeric_date")]
    pub auth_time: Option<f64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "cognito:username")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Aud {
    One(String),
    Many(Vec<String>),
}

impl Claims {
    pub fn from_payload(payload: Map<String, Json>) -> Result<Self, VerifyError> {
        serde_json::from_value(Json::Object(payload)).map_err(|e| VerifyError::MalformedToken(format!("claims: {e}")))
    }

    /// Looks up any claim by name, named or custom.
    pub fn get(&self, name: &str) -> Option<Json> {
        match name {
            "iss" => Some(Json::from(self.iss.clone())),
            "token_use" => Some(Json::from(self.token_use.clone())),
            "sub" => self.sub.clone().map(Json::from),
            "exp" => self.exp.map(numeric_date::to_json),
            "nbf" => self.nbf.map(numeric_date::to_json),
            "iat" => self.iat.map(numeric_date::to_json),
            "auth_time" => self.auth_time.map(numeric_date::to_json),
            "email" => self.email.clone().map(Json::from),
            "cognito:username" => self.username.clone().map(Json::from),
            "aud" => self.aud.as_ref().and_then(|a| serde_json::to_value(a).ok()),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// JWT NumericDate: seconds since the epoch, integral or fractional.
/// Strings, booleans and non-finite numbers are rejected.
mod numeric_date {
    use super::*;
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;

    const I64_RANGE: f64 = 9.223_372_036_854_775_807e18;

    fn is_integral(v: f64) -> bool {
        v.fract() == 0.0 && v.abs() < I64_RANGE
    }

    pub fn to_json(v: f64) -> Json {
        if is_integral(v) { Json::from(v as i64) } else { Json::from(v) }
    }

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match *value {
            Some(v) if is_integral(v) => serializer.serialize_some(&(v as i64)),
            Some(v) => serializer.serialize_some(&v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        struct NumericDate;

        impl<'de> Visitor<'de> for NumericDate {
            type Value = Option<f64>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a NumericDate (seconds since the epoch)")
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                Ok(Some(value as f64))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(Some(value as f64))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
                if value.is_finite() {
                    Ok(Some(value))
                } else {
                    Err(E::custom("NumericDate must be finite"))
                }
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(None)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(None)
            }

            fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
                deserializer.deserialize_any(NumericDate)
            }
        }

        deserializer.deserialize_any(NumericDate)
    }
}

/// Issuer and token-use policy. Time claims are checked alongside the signature.
pub fn validate(claims: &Claims, issuer_url: &str) -> Result<(), VerifyError> {
    if claims.iss != issuer_url {
        return Err(VerifyError::IssuerMismatch { expected: issuer_url.to_string(), actual: claims.iss.clone() });
    }
    if claims.token_use != ID_TOKEN_USE {
        return Err(VerifyError::InvalidTokenUse(claims.token_use.clone()));
    }
    Ok(())
}
