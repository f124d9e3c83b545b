//! Identity verification seam
//!
//! The core never parses credentials itself: a verifier turns an opaque
//! credential into a verified identity, and facade entry points receive the
//! already-resolved caller.

use async_trait::async_trait;

use crate::auth::jwt::{Claims, JwtValidator};
use crate::db::schemas::Role;
use crate::types::{AtriumError, Result};

/// Identity established by credential verification
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub subject_id: String,
    pub email: String,
    pub role: Role,
}

impl VerifiedIdentity {
    pub fn caller(&self) -> CallerIdentity {
        CallerIdentity {
            subject_id: self.subject_id.clone(),
            email: self.email.clone(),
            is_admin: self.role == Role::Admin,
        }
    }
}

impl From<Claims> for VerifiedIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            subject_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Pre-authenticated caller handed to facade entry points
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub subject_id: String,
    pub email: String,
    pub is_admin: bool,
}

/// Credential verification, delegated to an external identity provider
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<VerifiedIdentity>;
}

/// JWT-backed verifier
pub struct JwtIdentityVerifier {
    jwt: JwtValidator,
}

impl JwtIdentityVerifier {
    pub fn new(jwt: JwtValidator) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, credential: &str) -> Result<VerifiedIdentity> {
        let result = self.jwt.verify_token(credential);

        match result.claims {
            Some(claims) if result.valid => Ok(claims.into()),
            _ => Err(AtriumError::InvalidCredential(
                result.error.unwrap_or_else(|| "invalid token".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenInput;

    #[tokio::test]
    async fn test_verify_roundtrip() {
        let jwt = JwtValidator::new_dev();
        let token = jwt
            .generate_token(TokenInput {
                subject_id: "sub-9".to_string(),
                email: "a@example.test".to_string(),
                role: Role::Admin,
            })
            .expect("generate");

        let verifier = JwtIdentityVerifier::new(jwt);
        let identity = verifier.verify(&token).await.expect("verify");
        assert_eq!(identity.subject_id, "sub-9");
        assert!(identity.caller().is_admin);
    }

    #[tokio::test]
    async fn test_verify_rejects_garbage() {
        let verifier = JwtIdentityVerifier::new(JwtValidator::new_dev());
        let err = verifier.verify("garbage").await.unwrap_err();
        assert!(matches!(err, AtriumError::InvalidCredential(_)));
    }
}
