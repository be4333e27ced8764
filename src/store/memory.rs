use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CreateOutcome, CredentialStore, LinkOutcome, NewUser, SortField, SortOrder, UserQuery,
    UserRecord, UserSummary, UserUpdate,
};
use crate::auth::identity::RoleRef;

#[derive(Debug, Clone)]
struct StoredUser {
    id: Uuid,
    username: String,
    name: Option<String>,
    avatar: Option<String>,
    password_hash: String,
}

#[derive(Debug)]
struct ResetEntry {
    username: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<String, StoredUser>,
    roles: BTreeMap<String, RoleRef>,
    /// (username, role tag)
    links: BTreeSet<(String, String)>,
    reset_tokens: HashMap<Vec<u8>, ResetEntry>,
}

impl Inner {
    fn roles_of(&self, username: &str) -> Vec<RoleRef> {
        self.links
            .iter()
            .filter(|(user, _)| user == username)
            .filter_map(|(_, tag)| self.roles.get(tag).cloned())
            .collect()
    }

    fn record(&self, user: &StoredUser) -> UserRecord {
        UserRecord {
            id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
            avatar: user.avatar.clone(),
            password_hash: user.password_hash.clone(),
            roles: self.roles_of(&user.username),
        }
    }
}

/// In-process credential store. Data lives as long as the value.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Inner>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(username).map(|user| inner.record(user)))
    }

    async fn list_users(&self, query: &UserQuery) -> Result<(Vec<UserSummary>, u64)> {
        let inner = self.inner.read().await;
        let needle = query
            .search
            .as_deref()
            .map(str::to_lowercase)
            .filter(|s| !s.is_empty());

        let mut matches: Vec<UserRecord> = inner
            .users
            .values()
            .filter(|user| {
                needle.as_deref().is_none_or(|needle| {
                    user.username.to_lowercase().contains(needle)
                        || user
                            .name
                            .as_deref()
                            .is_some_and(|name| name.to_lowercase().contains(needle))
                })
            })
            .filter(|user| {
                query.role.as_deref().is_none_or(|tag| {
                    inner
                        .links
                        .contains(&(user.username.clone(), tag.to_string()))
                })
            })
            .map(|user| inner.record(user))
            .collect();

        if let Some((field, order)) = query.sort {
            matches.sort_by(|a, b| {
                let ordering = match field {
                    SortField::Username => a.username.cmp(&b.username),
                    SortField::Name => a.name.cmp(&b.name),
                };
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        let total = matches.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let page = matches
            .iter()
            .skip(offset)
            .take(query.page_size as usize)
            .map(UserRecord::summary)
            .collect();
        Ok((page, total))
    }

    async fn create_user(&self, user: NewUser) -> Result<CreateOutcome<UserSummary>> {
        let mut inner = self.inner.write().await;
        if inner.users.contains_key(&user.username) {
            return Ok(CreateOutcome::Conflict);
        }
        let stored = StoredUser {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            name: user.name,
            avatar: user.avatar,
            password_hash: user.password_hash,
        };
        let summary = inner.record(&stored).summary();
        inner.users.insert(user.username, stored);
        Ok(CreateOutcome::Created(summary))
    }

    async fn update_user(
        &self,
        username: &str,
        update: UserUpdate,
    ) -> Result<Option<UserSummary>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.get_mut(username) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            user.name = Some(name);
        }
        if let Some(avatar) = update.avatar {
            user.avatar = Some(avatar);
        }
        if let Some(hash) = update.password_hash {
            user.password_hash = hash;
        }
        let user = user.clone();
        Ok(Some(inner.record(&user).summary()))
    }

    async fn delete_user(&self, username: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.users.remove(username).is_none() {
            return Ok(false);
        }
        inner.links.retain(|(user, _)| user != username);
        inner.reset_tokens.retain(|_, entry| entry.username != username);
        Ok(true)
    }

    async fn list_roles(&self) -> Result<Vec<RoleRef>> {
        let inner = self.inner.read().await;
        Ok(inner.roles.values().cloned().collect())
    }

    async fn create_role(&self, role: RoleRef) -> Result<CreateOutcome<RoleRef>> {
        let mut inner = self.inner.write().await;
        if inner.roles.contains_key(&role.tag) {
            return Ok(CreateOutcome::Conflict);
        }
        inner.roles.insert(role.tag.clone(), role.clone());
        Ok(CreateOutcome::Created(role))
    }

    async fn delete_role(&self, tag: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.roles.remove(tag).is_none() {
            return Ok(false);
        }
        inner.links.retain(|(_, linked)| linked != tag);
        Ok(true)
    }

    async fn assign_role(&self, username: &str, tag: &str) -> Result<LinkOutcome> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(username) || !inner.roles.contains_key(tag) {
            return Ok(LinkOutcome::Missing);
        }
        inner.links.insert((username.to_string(), tag.to_string()));
        Ok(LinkOutcome::Linked)
    }

    async fn revoke_role(&self, username: &str, tag: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .links
            .remove(&(username.to_string(), tag.to_string())))
    }

    async fn has_role(&self, username: &str, tag: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .links
            .contains(&(username.to_string(), tag.to_string())))
    }

    async fn store_reset_token(
        &self,
        username: &str,
        token_hash: Vec<u8>,
        ttl_seconds: i64,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(username) {
            return Ok(false);
        }
        let ttl = Duration::from_secs(u64::try_from(ttl_seconds).unwrap_or(0));
        inner.reset_tokens.retain(|_, entry| entry.username != username);
        inner.reset_tokens.insert(
            token_hash,
            ResetEntry {
                username: username.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn consume_reset_token(&self, token_hash: &[u8]) -> Result<Option<String>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .reset_tokens
            .remove(token_hash)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.username))
    }
}
