use anyhow::{bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::jwt::current_unix_timestamp;

/// Audience every hook token must carry.
pub const HOOK_AUDIENCE: &str = "chatline-hooks";
pub const SERVICE_TOKEN_TTL_SECONDS: i64 = 10 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServiceTokenClaims {
    sub: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Verifies tokens minted by the CRUD service and the assistant worker for
/// `/v1/hooks`.
///
/// Hook tokens are signed with their own secret, so an end-user access token
/// never verifies here and a hook token never opens a WebSocket.
#[derive(Clone)]
pub struct ServiceTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl ServiceTokenService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("hook secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_audience(&[HOOK_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue_service_token(&self, service: &str) -> anyhow::Result<String> {
        self.issue_service_token_at(service, current_unix_timestamp()?)
    }

    fn issue_service_token_at(&self, service: &str, issued_at: i64) -> anyhow::Result<String> {
        let claims = ServiceTokenClaims {
            sub: service.to_string(),
            aud: HOOK_AUDIENCE.to_string(),
            iat: issued_at,
            exp: issued_at + SERVICE_TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode service token")
    }

    /// Returns the calling service's name.
    pub fn validate_service_token(&self, token: &str) -> anyhow::Result<String> {
        let claims = decode::<ServiceTokenClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode service token")?
            .claims;

        if claims.sub.trim().is_empty() {
            bail!("service token has an empty subject");
        }
        Ok(claims.sub)
    }
}
