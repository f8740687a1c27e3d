use crate::domain::{DomainResult, FarmDirectory};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory FarmDirectory, seeded by the caller
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    animal_owners: Arc<RwLock<HashMap<String, String>>>,
    veterinarians: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_animal(&self, animal_id: impl Into<String>, owner_id: impl Into<String>) {
        self.animal_owners
            .write()
            .await
            .insert(animal_id.into(), owner_id.into());
    }

    pub async fn add_veterinarian(&self, user_id: impl Into<String>) {
        self.veterinarians.write().await.insert(user_id.into());
    }
}

#[async_trait]
impl FarmDirectory for InMemoryDirectory {
    async fn owner_of(&self, animal_id: &str) -> DomainResult<Option<String>> {
        Ok(self.animal_owners.read().await.get(animal_id).cloned())
    }

    async fn is_veterinarian(&self, user_id: &str) -> DomainResult<bool> {
        Ok(self.veterinarians.read().await.contains(user_id))
    }
}
