//! Creating, redefining, renaming and deleting short links
//!
//! Redefining gives the link a new uid, which detaches it from the analytics
//! recorded under the old one. Renaming carries the uid to the new id. Every
//! change drops the cache entries of the ids involved.

use std::sync::Arc;
use tracing::info;

use crate::analytics::WindowedCache;
use crate::errors::{ServiceError, ServiceResult};
use crate::models::{RuleInput, ShortLink};
use crate::rules::{validate_link_id, validate_rules, DEFAULT_MAX_RULES};
use crate::storage::{Storage, StorageError};

/// Random 128-bit identity, hex encoded
pub fn generate_uid() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct LinkManager {
    storage: Arc<dyn Storage>,
    cache: Arc<WindowedCache>,
    max_rules: usize,
}

impl LinkManager {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<WindowedCache>) -> Self {
        Self {
            storage,
            cache,
            max_rules: DEFAULT_MAX_RULES,
        }
    }

    pub fn with_max_rules(mut self, max_rules: usize) -> Self {
        self.max_rules = max_rules;
        self
    }

    /// Active link by id
    pub async fn get(&self, id: &str) -> ServiceResult<ShortLink> {
        let id = validate_link_id(id)?;
        self.storage
            .get_link(&id)
            .await?
            .filter(|link| !link.deleted)
            .ok_or(ServiceError::NotFound(id))
    }

    /// Active link by id, only for its owner
    pub async fn get_owned(&self, id: &str, owner: &str) -> ServiceResult<ShortLink> {
        let link = self.get(id).await?;
        if !link.is_owned_by(owner) {
            return Err(ServiceError::Forbidden);
        }
        Ok(link)
    }

    /// Create a link. A deleted link with the same id can be taken back by
    /// its previous (named) owner.
    pub async fn create(
        &self,
        id: &str,
        rules: &[RuleInput],
        owner: Option<&str>,
    ) -> ServiceResult<ShortLink> {
        let id = validate_link_id(id)?;
        let rules = validate_rules(rules, self.max_rules)?;

        let link = ShortLink {
            id: id.clone(),
            uid: generate_uid(),
            counters: vec![0; rules.len()],
            rules,
            first_event_minute: None,
            owner: owner.map(str::to_string),
            deleted: false,
            created_at: chrono::Utc::now().timestamp(),
        };

        match self.storage.insert_link(&link).await {
            Ok(()) => {
                info!("Created short link {}", id);
                Ok(link)
            }
            Err(StorageError::Conflict) => self.revive(link).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn revive(&self, link: ShortLink) -> ServiceResult<ShortLink> {
        let existing = self.storage.get_link(&link.id).await?;
        let revivable = existing.as_ref().is_some_and(|existing| {
            existing.deleted && existing.owner.is_some() && existing.owner == link.owner
        });
        if !revivable {
            return Err(ServiceError::Conflict(link.id));
        }

        if !self
            .storage
            .replace_rules(&link.id, &link.uid, &link.rules, link.owner.as_deref())
            .await?
        {
            return Err(ServiceError::NotFound(link.id));
        }
        self.cache.invalidate(&link.id).await;

        info!("Recreated deleted short link {}", link.id);
        let created_at = existing.map_or(link.created_at, |e| e.created_at);
        Ok(ShortLink { created_at, ..link })
    }

    /// Replace the rules of a link the caller owns
    pub async fn redefine(
        &self,
        id: &str,
        rules: &[RuleInput],
        owner: &str,
    ) -> ServiceResult<ShortLink> {
        let link = self.get_owned(id, owner).await?;
        let rules = validate_rules(rules, self.max_rules)?;
        let uid = generate_uid();

        if !self
            .storage
            .replace_rules(&link.id, &uid, &rules, link.owner.as_deref())
            .await?
        {
            return Err(ServiceError::NotFound(link.id));
        }
        self.cache.invalidate(&link.id).await;

        info!("Redefined short link {}", link.id);
        Ok(ShortLink {
            uid,
            counters: vec![0; rules.len()],
            rules,
            first_event_minute: None,
            ..link
        })
    }

    /// Move a link the caller owns to `new_id`, analytics included. The old
    /// id is left deleted with fresh, empty analytics. `new_id` must be free
    /// or a deleted link of the same owner.
    pub async fn rename(&self, id: &str, new_id: &str, owner: &str) -> ServiceResult<ShortLink> {
        let new_id = validate_link_id(new_id)?;
        let link = self.get_owned(id, owner).await?;
        if link.id == new_id {
            return Err(ServiceError::Conflict(new_id));
        }

        if let Some(target) = self.storage.get_link(&new_id).await? {
            if !target.deleted || !target.is_owned_by(owner) {
                return Err(ServiceError::Conflict(new_id));
            }
        }

        match self.storage.move_link(&link, &new_id, &generate_uid()).await {
            Ok(true) => {}
            Ok(false) => return Err(ServiceError::NotFound(link.id)),
            Err(StorageError::Conflict) => return Err(ServiceError::Conflict(new_id)),
            Err(e) => return Err(e.into()),
        }
        self.cache.invalidate(&link.id).await;
        self.cache.invalidate(&new_id).await;

        info!("Renamed short link {} to {}", link.id, new_id);
        Ok(ShortLink { id: new_id, ..link })
    }

    /// Soft delete a link the caller owns
    pub async fn delete(&self, id: &str, owner: &str) -> ServiceResult<()> {
        let link = self.get_owned(id, owner).await?;

        if !self.storage.soft_delete(&link.id).await? {
            return Err(ServiceError::NotFound(link.id));
        }
        self.cache.invalidate(&link.id).await;

        info!("Deleted short link {}", link.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uid() {
        let a = generate_uid();
        let b = generate_uid();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
