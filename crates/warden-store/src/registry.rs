//! The chatroom registry: which chats the bot manages, their policy records
//! and their public deep links.
//!
//! The platform offers no way to enumerate the chats a bot is in, so the
//! registry is the only source for that list. Three tables share the chat
//! id as field key: `chatrooms`, `settings` and `public-links`.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use warden_shared::constants::{
    SCAN_PAGE_SIZE, TABLE_CHATROOMS, TABLE_PUBLIC_LINKS, TABLE_SETTINGS,
};
use warden_shared::{ChatId, ChatRecord, PlatformClient, PlatformError, PolicySettings};

use crate::category::{CategoryAssignments, CategoryTree};
use crate::error::{Result, StoreError};
use crate::kv::{scan_all, KvStore};

#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn KvStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    // ------------------------------------------------------------------
    // Chat records
    // ------------------------------------------------------------------

    /// Insert or overwrite a chat record.
    ///
    /// Only the fields of [`ChatRecord`] are persisted; platform extras such
    /// as pinned messages never reach the store, so every stored entry can
    /// be read back.
    pub async fn upsert(&self, record: &ChatRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.store
            .hset(TABLE_CHATROOMS, &record.id.to_field(), &json)
            .await?;
        debug!(chat = %record.id, title = %record.title, "chat record stored");
        Ok(())
    }

    /// Fetch one chat record. A corrupt entry is an error here, unlike in
    /// [`Registry::list`].
    pub async fn get(&self, chat: ChatId) -> Result<Option<ChatRecord>> {
        let field = chat.to_field();
        let Some(json) = self.store.hget(TABLE_CHATROOMS, &field).await? else {
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                table: TABLE_CHATROOMS,
                field,
                source,
            })
    }

    /// Remove a chat's record, policy and deep link.
    ///
    /// Every removal is attempted even if an earlier one fails; any failure
    /// is reported as [`StoreError::PartialDelete`].
    pub async fn delete(&self, chat: ChatId) -> Result<()> {
        let field = chat.to_field();
        let mut failed = Vec::new();

        for table in [TABLE_PUBLIC_LINKS, TABLE_SETTINGS, TABLE_CHATROOMS] {
            if let Err(e) = self.store.hdel(table, &field).await {
                warn!(chat = %chat, table, error = %e, "failed to delete chat entry");
                failed.push(table);
            }
        }

        if failed.is_empty() {
            info!(chat = %chat, "chat removed from registry");
            Ok(())
        } else {
            Err(StoreError::PartialDelete { chat, failed })
        }
    }

    /// Every chat the bot is in, in no particular order.
    ///
    /// Entries that fail to deserialize are logged and skipped.
    pub async fn list(&self) -> Result<Vec<ChatRecord>> {
        let entries = scan_all(self.store.as_ref(), TABLE_CHATROOMS, SCAN_PAGE_SIZE).await?;

        let mut chats = Vec::with_capacity(entries.len());
        for (field, json) in entries {
            match serde_json::from_str::<ChatRecord>(&json) {
                Ok(record) => chats.push(record),
                Err(e) => {
                    warn!(field = %field, error = %e, "skipping corrupt chatroom entry");
                }
            }
        }
        Ok(chats)
    }

    /// Number of managed chats, from the store's cardinality counter.
    pub async fn count(&self) -> Result<u64> {
        self.store.hlen(TABLE_CHATROOMS).await
    }

    /// Build the directory tree from a single registry scan.
    pub async fn category_tree(&self, assignments: &CategoryAssignments) -> Result<CategoryTree> {
        Ok(CategoryTree::build(self.list().await?, assignments))
    }

    // ------------------------------------------------------------------
    // Policy settings
    // ------------------------------------------------------------------

    pub async fn settings(&self, chat: ChatId) -> Result<Option<PolicySettings>> {
        let field = chat.to_field();
        let Some(json) = self.store.hget(TABLE_SETTINGS, &field).await? else {
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                table: TABLE_SETTINGS,
                field,
                source,
            })
    }

    pub async fn save_settings(&self, chat: ChatId, settings: &PolicySettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.store
            .hset(TABLE_SETTINGS, &chat.to_field(), &json)
            .await
    }

    // ------------------------------------------------------------------
    // Deep links
    // ------------------------------------------------------------------

    /// Bind a public deep-link token to a chat, replacing any previous one.
    pub async fn set_deep_link(&self, chat: ChatId, token: Uuid) -> Result<()> {
        self.store
            .hset(TABLE_PUBLIC_LINKS, &chat.to_field(), &token.to_string())
            .await
    }

    pub async fn deep_link(&self, chat: ChatId) -> Result<Option<Uuid>> {
        Ok(self
            .store
            .hget(TABLE_PUBLIC_LINKS, &chat.to_field())
            .await?
            .and_then(|s| Uuid::parse_str(&s).ok()))
    }

    /// Map a deep-link token to its chat. Malformed and unknown tokens are
    /// both [`StoreError::NotFound`].
    pub async fn resolve_deep_link(&self, token: &str) -> Result<ChatId> {
        let token = Uuid::parse_str(token.trim()).map_err(|_| StoreError::NotFound)?;

        let entries = scan_all(self.store.as_ref(), TABLE_PUBLIC_LINKS, SCAN_PAGE_SIZE).await?;
        entries
            .into_iter()
            .find(|(_, value)| Uuid::parse_str(value).is_ok_and(|u| u == token))
            .and_then(|(field, _)| ChatId::from_field(&field))
            .ok_or(StoreError::NotFound)
    }

    // ------------------------------------------------------------------
    // Invite links
    // ------------------------------------------------------------------

    /// Invite link for a registered chat.
    pub async fn invite_link_for(
        &self,
        platform: &dyn PlatformClient,
        chat: ChatId,
    ) -> Result<(String, ChatRecord)> {
        let record = self.get(chat).await?.ok_or(StoreError::NotFound)?;
        self.resolve_invite_link(platform, record).await
    }

    /// Drop the cached link and generate a new one.
    pub async fn refresh_invite_link(
        &self,
        platform: &dyn PlatformClient,
        chat: ChatId,
    ) -> Result<(String, ChatRecord)> {
        let mut record = self.get(chat).await?.ok_or(StoreError::NotFound)?;
        record.invite_link = None;
        self.resolve_invite_link(platform, record).await
    }

    /// Return the cached invite link, or fetch and cache one.
    ///
    /// If the platform reports that the chat migrated, the record (with its
    /// policy and deep link) is moved to the new identity and the link is
    /// requested once more for the new chat. No further retries.
    pub async fn resolve_invite_link(
        &self,
        platform: &dyn PlatformClient,
        mut record: ChatRecord,
    ) -> Result<(String, ChatRecord)> {
        if let Some(link) = &record.invite_link {
            return Ok((link.clone(), record));
        }

        match platform.export_invite_link(record.id).await {
            Ok(link) => {
                record.invite_link = Some(link.clone());
                self.upsert(&record).await?;
                Ok((link, record))
            }
            Err(PlatformError::Migrated { new_chat }) => {
                info!(old = %record.id, new = %new_chat, "chat migrated, remapping registry entry");

                let live = platform.get_chat(new_chat).await?;
                let mut migrated = ChatRecord {
                    invite_link: None,
                    hidden: record.hidden,
                    ..live
                };
                self.remap(record.id, &migrated).await?;

                let link = platform.export_invite_link(new_chat).await?;
                migrated.invite_link = Some(link.clone());
                self.upsert(&migrated).await?;
                Ok((link, migrated))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move everything stored under `old` to `new_record.id`.
    pub async fn remap(&self, old: ChatId, new_record: &ChatRecord) -> Result<()> {
        let new = new_record.id;
        if let Some(settings) = self.settings(old).await? {
            self.save_settings(new, &settings).await?;
        }
        if let Some(token) = self.deep_link(old).await? {
            self.set_deep_link(new, token).await?;
        }
        self.upsert(new_record).await?;
        self.delete(old).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use warden_shared::mock::{Call, MockPlatform};
    use warden_shared::{Action, ChatKind};

    use super::*;
    use crate::kv::{MemoryKv, ScanPage};

    fn registry() -> (Arc<MemoryKv>, Registry) {
        let kv = Arc::new(MemoryKv::new());
        (kv.clone(), Registry::new(kv))
    }

    fn group(id: i64, title: &str) -> ChatRecord {
        ChatRecord::new(ChatId(id), ChatKind::Group, title)
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_listed() {
        let (_, reg) = registry();
        let mut chat = group(-10, "Algebra");
        reg.upsert(&chat).await.unwrap();
        reg.upsert(&chat).await.unwrap();
        chat.title = "Algebra I".into();
        reg.upsert(&chat).await.unwrap();

        let listed = reg.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, ChatId(-10));
        assert_eq!(listed[0].title, "Algebra I");
        assert_eq!(reg.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_skips_corrupt_entries() {
        let (kv, reg) = registry();
        reg.upsert(&group(-1, "Good")).await.unwrap();
        kv.hset(TABLE_CHATROOMS, "-2", "{not json").await.unwrap();

        let listed = reg.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Good");

        // As a direct target the corrupt entry is an error.
        assert!(matches!(
            reg.get(ChatId(-2)).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn legacy_entries_with_extra_fields_still_load() {
        let (kv, reg) = registry();
        kv.hset(
            TABLE_CHATROOMS,
            "-3",
            r#"{"id":-3,"kind":"supergroup","title":"Old","pinned_message":{"id":9,"weird":[1,2]}}"#,
        )
        .await
        .unwrap();

        let listed = reg.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].kind, ChatKind::Supergroup);
    }

    #[tokio::test]
    async fn delete_removes_all_three_entries() {
        let (_, reg) = registry();
        let platform = MockPlatform::new(1);
        let chat = group(-7, "Physics");
        reg.upsert(&chat).await.unwrap();
        reg.save_settings(chat.id, &PolicySettings::default()).await.unwrap();
        reg.set_deep_link(chat.id, Uuid::new_v4()).await.unwrap();

        reg.delete(chat.id).await.unwrap();

        assert!(reg.list().await.unwrap().iter().all(|c| c.id != chat.id));
        assert!(reg.settings(chat.id).await.unwrap().is_none());
        assert!(reg.deep_link(chat.id).await.unwrap().is_none());
        assert!(matches!(
            reg.invite_link_for(&platform, chat.id).await,
            Err(StoreError::NotFound)
        ));
    }

    /// Store that fails deletes on selected tables.
    struct FlakyKv {
        inner: MemoryKv,
        failing_tables: HashSet<&'static str>,
    }

    #[async_trait]
    impl KvStore for FlakyKv {
        async fn hget(&self, table: &str, field: &str) -> Result<Option<String>> {
            self.inner.hget(table, field).await
        }
        async fn hset(&self, table: &str, field: &str, value: &str) -> Result<()> {
            self.inner.hset(table, field, value).await
        }
        async fn hdel(&self, table: &str, field: &str) -> Result<bool> {
            if self.failing_tables.contains(table) {
                return Err(StoreError::Io(std::io::Error::other("connection reset")));
            }
            self.inner.hdel(table, field).await
        }
        async fn hlen(&self, table: &str) -> Result<u64> {
            self.inner.hlen(table).await
        }
        async fn hscan(&self, table: &str, cursor: u64, count: usize) -> Result<ScanPage> {
            self.inner.hscan(table, cursor, count).await
        }
    }

    #[tokio::test]
    async fn partial_delete_is_reported() {
        let kv = Arc::new(FlakyKv {
            inner: MemoryKv::new(),
            failing_tables: [TABLE_SETTINGS].into_iter().collect(),
        });
        let reg = Registry::new(kv);
        let chat = group(-8, "Chemistry");
        reg.upsert(&chat).await.unwrap();
        reg.save_settings(chat.id, &PolicySettings::default()).await.unwrap();

        match reg.delete(chat.id).await {
            Err(StoreError::PartialDelete { chat: c, failed }) => {
                assert_eq!(c, chat.id);
                assert_eq!(failed, vec![TABLE_SETTINGS]);
            }
            other => panic!("expected partial delete, got {other:?}"),
        }
        // The other removals still happened.
        assert!(reg.get(chat.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invite_link_is_cached() {
        let (_, reg) = registry();
        let platform = MockPlatform::new(1);
        let chat = group(-20, "Biology");
        platform.add_chat(chat.clone());
        reg.upsert(&chat).await.unwrap();

        let (first, _) = reg.invite_link_for(&platform, chat.id).await.unwrap();
        let (second, _) = reg.invite_link_for(&platform, chat.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(platform.count(|c| matches!(c, Call::ExportLink(_))), 1);

        let (fresh, _) = reg.refresh_invite_link(&platform, chat.id).await.unwrap();
        assert_ne!(fresh, first);
    }

    #[tokio::test]
    async fn migration_remaps_and_retries_once() {
        let (_, reg) = registry();
        let platform = MockPlatform::new(1);
        let old = group(-30, "Databases");
        let mut new = ChatRecord::new(ChatId(-1000000000030), ChatKind::Supergroup, "Databases");
        new.username = Some("db_course".into());
        platform.add_chat(old.clone());
        platform.migrate(old.id, new.clone());

        reg.upsert(&old).await.unwrap();
        let settings = PolicySettings {
            bot_enabled: true,
            on_join_arabic: Action::Ban,
            ..PolicySettings::default()
        };
        reg.save_settings(old.id, &settings).await.unwrap();
        let token = Uuid::new_v4();
        reg.set_deep_link(old.id, token).await.unwrap();

        let (link, record) = reg.invite_link_for(&platform, old.id).await.unwrap();
        assert!(!link.is_empty());
        assert_eq!(record.id, new.id);

        let ids: Vec<ChatId> = reg.list().await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![new.id]);
        assert_eq!(reg.settings(new.id).await.unwrap(), Some(settings));
        assert_eq!(reg.resolve_deep_link(&token.to_string()).await.unwrap(), new.id);

        // Link export: once for the old id, once for the new id.
        assert_eq!(platform.count(|c| matches!(c, Call::ExportLink(_))), 2);

        // Subsequent resolution is served from the cache of the new record.
        let (again, _) = reg.invite_link_for(&platform, new.id).await.unwrap();
        assert_eq!(again, link);
    }

    #[tokio::test]
    async fn deep_link_resolution() {
        let (_, reg) = registry();
        let token = Uuid::new_v4();
        reg.set_deep_link(ChatId(-50), token).await.unwrap();
        reg.set_deep_link(ChatId(-51), Uuid::new_v4()).await.unwrap();

        assert_eq!(
            reg.resolve_deep_link(&token.to_string()).await.unwrap(),
            ChatId(-50)
        );
        assert!(matches!(
            reg.resolve_deep_link("definitely-not-a-uuid").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            reg.resolve_deep_link(&Uuid::new_v4().to_string()).await,
            Err(StoreError::NotFound)
        ));
    }
}
