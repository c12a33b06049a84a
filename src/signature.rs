//! RS256 signature check plus the time claims (`exp`, `nbf`).

use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier as _;
use sha2::Sha256;
use tracing::debug;

use crate::claims::Claims;
use crate::jwk::decode_public_pem;
use crate::token::{decode_complete, DecodedToken};
use crate::{VerifyError, VerifyOptions, RS256};

/// Verifies `token` against a single PEM public key and returns its claims.
///
/// Only RS256 is accepted, whatever the header says. `exp`/`nbf` are checked
/// against `opts.now()` with `opts.leeway_secs` of tolerance; issuer and
/// token use are not looked at here.
pub fn verify_with_pem(token: &str, pem: &str, opts: &VerifyOptions) -> Result<Claims, VerifyError> {
    let decoded = decode_complete(token)?;
    verify_decoded(&decoded, pem, opts)
}

pub(crate) fn verify_decoded(token: &DecodedToken, pem: &str, opts: &VerifyOptions) -> Result<Claims, VerifyError> {
    if token.header.alg != RS256 {
        return Err(VerifyError::AlgorithmNotAllowed(token.header.alg.clone()));
    }
    let key = VerifyingKey::<Sha256>::new(decode_public_pem(pem)?);
    let sig = Signature::try_from(token.signature.as_slice()).map_err(|_| VerifyError::SignatureInvalid)?;
    key.verify(token.signing_input.as_bytes(), &sig).map_err(|_| VerifyError::SignatureInvalid)?;

    let claims = Claims::from_payload(token.payload.clone())?;
    check_times(&claims, opts)?;
    debug!(kid = ?token.header.kid, sub = ?claims.sub, "signature verified");
    Ok(claims)
}

// `now` is whole seconds, so comparing against the ceiling of a fractional
// claim is exact. The float cast saturates, and so do the additions.
fn check_times(c: &Claims, opts: &VerifyOptions) -> Result<(), VerifyError> {
    let now = opts.now();
    if let Some(exp) = c.exp {
        if now >= (exp.ceil() as i64).saturating_add(opts.leeway_secs) {
            return Err(VerifyError::TokenExpired);
        }
    }
    if let Some(nbf) = c.nbf {
        if now.saturating_add(opts.leeway_secs) < nbf.ceil() as i64 {
            return Err(VerifyError::TokenNotYetValid);
        }
    }
    Ok(())
}
