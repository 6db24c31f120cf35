//! Inbound request authentication for the bearer-jwt trust model.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::JwtSettings;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

/// Validates HS256 bearer tokens against a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(settings: &JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match &settings.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &settings.issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
        }
    }

    /// Verifies a raw `Authorization` header value.
    pub fn verify_header(&self, header: Option<&str>) -> Result<(), ApiError> {
        let Some(token) = header.and_then(bearer_token) else {
            debug!("request without bearer token");
            return Err(ApiError::Unauthorized);
        };

        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => {
                debug!(sub = data.claims.sub.as_deref().unwrap_or("-"), "bearer token accepted");
                Ok(())
            }
            Err(e) => {
                warn!(reason = ?e.kind(), "bearer token rejected");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Middleware: rejects requests without a valid bearer JWT.
pub(crate) async fn require_bearer(
    State(verifier): State<Arc<JwtVerifier>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    verifier.verify_header(header)?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn token(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn exp_in(secs: i64) -> i64 {
        Utc::now().timestamp() + secs
    }

    #[test]
    fn accepts_valid_token() {
        let verifier = JwtVerifier::new(&JwtSettings::new("s3cret"));
        let jwt = token("s3cret", json!({"sub": "agent", "exp": exp_in(600)}));
        assert!(verifier.verify_header(Some(&format!("Bearer {}", jwt))).is_ok());
    }

    #[test]
    fn rejects_missing_and_malformed_headers() {
        let verifier = JwtVerifier::new(&JwtSettings::new("s3cret"));
        assert!(verifier.verify_header(None).is_err());
        assert!(verifier.verify_header(Some("Basic dXNlcjpwYXNz")).is_err());
        assert!(verifier.verify_header(Some("Bearer ")).is_err());
        assert!(verifier.verify_header(Some("Bearer not.a.jwt")).is_err());
    }

    #[test]
    fn rejects_wrong_secret_and_expired() {
        let verifier = JwtVerifier::new(&JwtSettings::new("s3cret"));
        let forged = token("other", json!({"exp": exp_in(600)}));
        assert!(verifier.verify_header(Some(&format!("Bearer {}", forged))).is_err());

        let expired = token("s3cret", json!({"exp": exp_in(-3600)}));
        assert!(verifier.verify_header(Some(&format!("Bearer {}", expired))).is_err());
    }

    #[test]
    fn checks_audience_and_issuer_when_configured() {
        let verifier = JwtVerifier::new(
            &JwtSettings::new("s3cret")
                .with_audience("gcalmcp")
                .with_issuer("https://issuer.example.com"),
        );
        let good = token(
            "s3cret",
            json!({"exp": exp_in(600), "aud": "gcalmcp", "iss": "https://issuer.example.com"}),
        );
        assert!(verifier.verify_header(Some(&format!("bearer {}", good))).is_ok());

        let wrong_aud = token(
            "s3cret",
            json!({"exp": exp_in(600), "aud": "other", "iss": "https://issuer.example.com"}),
        );
        assert!(verifier.verify_header(Some(&format!("Bearer {}", wrong_aud))).is_err());
    }
}
