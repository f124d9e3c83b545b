//! JWT token generation and validation
//!
//! HS256 tokens carrying the auth subject, email, and platform role. The
//! dev validator uses a fixed insecure secret so local stacks work without
//! configuration.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::schemas::Role;
use crate::types::AtriumError;

const DEV_SECRET: &str = "dev-only-insecure-secret";
const DEV_EXPIRY_SECONDS: u64 = 86_400;

/// Claims carried in Atrium tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// External auth subject id
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    /// Issued at (unix seconds)
    pub iat: u64,
    /// Expiry (unix seconds)
    pub exp: u64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Input for token generation
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub subject_id: String,
    pub email: String,
    pub role: Role,
}

/// Outcome of verifying a token
#[derive(Debug, Default)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

/// HS256 token signer/verifier
#[derive(Clone)]
pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a validator with the given secret
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, AtriumError> {
        if secret.len() < 16 {
            return Err(AtriumError::Config(
                "JWT secret must be at least 16 bytes".to_string(),
            ));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        })
    }

    /// Dev-mode validator with a fixed insecure secret
    pub fn new_dev() -> Self {
        Self {
            encoding: EncodingKey::from_secret(DEV_SECRET.as_bytes()),
            decoding: DecodingKey::from_secret(DEV_SECRET.as_bytes()),
            expiry_seconds: DEV_EXPIRY_SECONDS,
        }
    }

    /// Generate a signed token
    pub fn generate_token(&self, input: TokenInput) -> Result<String, AtriumError> {
        let now = chrono::Utc::now().timestamp() as u64;
        let claims = Claims {
            sub: input.subject_id,
            email: input.email,
            role: input.role,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AtriumError::Internal(format!("token generation failed: {e}")))
    }

    /// Verify a token and return its claims
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => TokenValidationResult {
                valid: true,
                claims: Some(data.claims),
                error: None,
            },
            Err(e) => TokenValidationResult {
                valid: false,
                claims: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Extract a bearer token from an Authorization header value
pub fn extract_token_from_header(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let jwt = JwtValidator::new_dev();
        let token = jwt
            .generate_token(TokenInput {
                subject_id: "sub-1".to_string(),
                email: "s@example.test".to_string(),
                role: Role::Student,
            })
            .expect("generate");

        let result = jwt.verify_token(&token);
        assert!(result.valid);
        let claims = result.claims.expect("claims");
        assert_eq!(claims.sub, "sub-1");
        assert!(!claims.is_admin());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = JwtValidator::new("sixteen-byte-secret!".to_string(), 3600).expect("signer");
        let token = signer
            .generate_token(TokenInput {
                subject_id: "sub-1".to_string(),
                email: "s@example.test".to_string(),
                role: Role::Admin,
            })
            .expect("generate");

        let result = JwtValidator::new_dev().verify_token(&token);
        assert!(!result.valid);
        assert!(result.claims.is_none());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let result = JwtValidator::new_dev().verify_token("not.a.token");
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_short_secret_refused() {
        assert!(JwtValidator::new("short".to_string(), 3600).is_err());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc.def.ghi")),
            Some("abc.def.ghi")
        );
        assert_eq!(extract_token_from_header(Some("Basic abc")), None);
        assert_eq!(extract_token_from_header(None), None);
    }
}
