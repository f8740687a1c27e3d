use crate::auth::{Principal, Role};
use crate::domain::DomainResult;

/// Resolves bearer tokens issued by the identity context into principals
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait IdentityProvider: Send + Sync {
    /// Validate a token and return the caller it identifies
    fn resolve_principal(&self, token: &str) -> DomainResult<Principal>;

    /// Issue a token for a principal. Login lives elsewhere; this exists for
    /// tooling and tests.
    fn generate_token(&self, user_id: &str, role: Role) -> DomainResult<String>;
}
