use jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims deliberately carry no role or family: both are re-read from
/// the member row on every request so revocations take effect at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub jti: String,
    pub exp: i64,
    pub member_id: String,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token: {0}")]
    Decode(String),
    #[error("encoding failed: {0}")]
    Encode(String),
}

pub fn decode_and_verify(token: &str, secret: &[u8]) -> Result<JwtClaims, JwtError> {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<JwtClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JwtError::Decode(e.to_string()))
}

pub fn encode(claims: &JwtClaims, secret: &[u8]) -> Result<String, JwtError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: i64) -> JwtClaims {
        JwtClaims {
            sub: "anna".into(),
            jti: "jti-1".into(),
            exp,
            member_id: "m1".into(),
        }
    }

    #[test]
    fn encode_then_verify_round_trips() {
        let secret = b"test-secret";
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = encode(&claims(exp), secret).unwrap();
        let decoded = decode_and_verify(&token, secret).unwrap();
        assert_eq!(decoded.sub, "anna");
        assert_eq!(decoded.member_id, "m1");
        assert_eq!(decoded.jti, "jti-1");
    }

    #[test]
    fn wrong_secret_rejected() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = encode(&claims(exp), b"secret-a").unwrap();
        assert!(decode_and_verify(&token, b"secret-b").is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let secret = b"test-secret";
        let exp = chrono::Utc::now().timestamp() - 3600;
        let token = encode(&claims(exp), secret).unwrap();
        assert!(decode_and_verify(&token, secret).is_err());
    }
}
