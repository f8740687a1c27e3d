use crate::auth::{IdentityProvider, JwtConfig, Principal, Role};
use crate::domain::{DomainError, DomainResult};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims issued by the identity context
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String, // user_id
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

/// HS256 JWT implementation of IdentityProvider
pub struct JwtIdentityProvider {
    config: JwtConfig,
}

impl JwtIdentityProvider {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn resolve_principal(&self, token: &str) -> DomainResult<Principal> {
        let token_data = decode::<JwtClaims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| DomainError::InvalidToken(e.to_string()))?;

        let role = token_data.claims.role.parse::<Role>()?;
        Ok(Principal::new(token_data.claims.sub, role))
    }

    fn generate_token(&self, user_id: &str, role: Role) -> DomainResult<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours as i64);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!("JWT encoding error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig::new("test-secret-key".to_string(), 24)
    }

    #[test]
    fn test_token_resolves_to_principal() {
        let provider = JwtIdentityProvider::new(test_config());
        let token = provider.generate_token("5", Role::Veterinarian).unwrap();

        let principal = provider.resolve_principal(&token).unwrap();
        assert_eq!(principal, Principal::new("5", Role::Veterinarian));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let provider = JwtIdentityProvider::new(test_config());
        let result = provider.resolve_principal("invalid-token");
        assert!(matches!(result, Err(DomainError::InvalidToken(_))));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let issuer = JwtIdentityProvider::new(test_config());
        let verifier =
            JwtIdentityProvider::new(JwtConfig::new("different-secret".to_string(), 24));

        let token = issuer.generate_token("1", Role::Farmer).unwrap();
        let result = verifier.resolve_principal(&token);
        assert!(matches!(result, Err(DomainError::InvalidToken(_))));
    }

    #[test]
    fn test_unknown_role_claim_is_rejected() {
        let config = test_config();
        let now = chrono::Utc::now();
        let claims = JwtClaims {
            sub: "1".to_string(),
            role: "superuser".to_string(),
            exp: (now + chrono::Duration::hours(1)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();

        let provider = JwtIdentityProvider::new(config);
        assert!(matches!(
            provider.resolve_principal(&token),
            Err(DomainError::InvalidToken(_))
        ));
    }
}
