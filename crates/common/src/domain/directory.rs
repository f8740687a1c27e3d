use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Read-only view of the platform's animal and user registries
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FarmDirectory: Send + Sync {
    /// Owner user ID of an animal, `None` if the animal does not exist
    async fn owner_of(&self, animal_id: &str) -> DomainResult<Option<String>>;

    /// Whether the user exists and holds the veterinarian role
    async fn is_veterinarian(&self, user_id: &str) -> DomainResult<bool>;
}
