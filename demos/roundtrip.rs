use cognito_jwt_verify::{pem_to_jwk, FetchError, Jwks, Verifier};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine as _};
use futures::executor::block_on;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::json;
use sha2::Sha256;

fn main() -> anyhow::Result<()> {
    let sk = RsaPrivateKey::new(&mut rand::thread_rng(), 2048)?;
    let pem = RsaPublicKey::from(&sk).to_public_key_pem(LineEnding::LF)?;
    let jwks = serde_json::to_string(&Jwks { keys: vec![pem_to_jwk(&pem, Some("demo"))?] })?;

    let verifier = Verifier::with_fetcher("eu-west-1_demo", &move |url: String| {
        println!("serving jwks for {url}");
        let body = jwks.clone();
        async move { Ok::<_, FetchError>(body) }
    });

    let now = cognito_jwt_verify::now_ts();
    let header = json!({"alg":"RS256","kid":"demo","typ":"JWT"});
    let payload = json!({ "sub":"demo-user", "iss": verifier.issuer_url(), "token_use":"id", "iat":now, "exp": now+600 });
    let hdr = B64URL.encode(serde_json::to_string(&header)?);
    let pld = B64URL.encode(serde_json::to_string(&payload)?);
    let msg = format!("{}.{}", hdr, pld);
    let sig = SigningKey::<Sha256>::new(sk).sign(msg.as_bytes());
    let jwt = format!("{}.{}", msg, B64URL.encode(sig.to_bytes()));

    let claims = block_on(verifier.verify(&jwt))?;
    println!("verified sub = {:?}", claims.sub);
    Ok(())
}
