//! Two-level category tree for the public group directory.
//!
//! The tree is a view rebuilt from one registry listing on every request;
//! category membership comes from configuration, not from the store.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::warn;
use warden_shared::{ChatId, ChatRecord};

/// Where a chat is listed in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryAssignment {
    pub category: String,
    #[serde(default)]
    pub sub_category: Option<String>,
}

/// Configured category of every chat that has one.
#[derive(Debug, Clone, Default)]
pub struct CategoryAssignments(HashMap<ChatId, CategoryAssignment>);

impl CategoryAssignments {
    /// Parse `{ "<chat id>": { "category": "...", "sub_category": "..." } }`.
    /// Keys that are not chat ids are skipped with a warning.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        let raw: HashMap<String, CategoryAssignment> = serde_json::from_str(json)?;
        let mut map = HashMap::with_capacity(raw.len());
        for (key, assignment) in raw {
            match ChatId::from_field(&key) {
                Some(id) => {
                    map.insert(id, assignment);
                }
                None => warn!(key = %key, "ignoring category entry with invalid chat id"),
            }
        }
        Ok(Self(map))
    }

    pub fn assign(&mut self, chat: ChatId, category: &str, sub_category: Option<&str>) {
        self.0.insert(
            chat,
            CategoryAssignment {
                category: category.to_string(),
                sub_category: sub_category.map(str::to_string),
            },
        );
    }

    pub fn get(&self, chat: ChatId) -> Option<&CategoryAssignment> {
        self.0.get(&chat)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A directory node: chats at this level plus named children.
///
/// At the root, `chats` holds the uncategorized chats and `sub_categories`
/// the top-level categories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryTree {
    pub chats: Vec<ChatRecord>,
    pub sub_categories: BTreeMap<String, CategoryTree>,
}

/// One top-level entry of the directory, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bucket<'a> {
    Uncategorized(&'a CategoryTree),
    Category { name: &'a str, tree: &'a CategoryTree },
}

impl CategoryTree {
    /// Place every chat in its configured category. Chats are sorted by
    /// title at every level.
    pub fn build(chats: Vec<ChatRecord>, assignments: &CategoryAssignments) -> Self {
        let mut root = CategoryTree::default();

        for chat in chats {
            let Some(assignment) = assignments.get(chat.id) else {
                root.chats.push(chat);
                continue;
            };

            let top = root
                .sub_categories
                .entry(assignment.category.clone())
                .or_default();

            match assignment.sub_category.as_deref() {
                Some(sub) if !sub.trim().is_empty() => {
                    top.sub_categories
                        .entry(sub.to_string())
                        .or_default()
                        .chats
                        .push(chat);
                }
                _ => top.chats.push(chat),
            }
        }

        root.sort();
        root
    }

    fn sort(&mut self) {
        self.chats
            .sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        for sub in self.sub_categories.values_mut() {
            sub.sort();
        }
    }

    /// Top-level presentation order: uncategorized first (when non-empty),
    /// then categories alphabetically.
    pub fn buckets(&self) -> Vec<Bucket<'_>> {
        let mut out = Vec::with_capacity(self.sub_categories.len() + 1);
        if !self.chats.is_empty() {
            out.push(Bucket::Uncategorized(self));
        }
        out.extend(
            self.sub_categories
                .iter()
                .map(|(name, tree)| Bucket::Category { name, tree }),
        );
        out
    }

    /// Top-level category by its position in alphabetical order.
    pub fn category_at(&self, index: usize) -> Option<(&str, &CategoryTree)> {
        self.sub_categories
            .iter()
            .nth(index)
            .map(|(name, tree)| (name.as_str(), tree))
    }

    /// Number of chats reachable from this node.
    pub fn total_chats(&self) -> usize {
        self.chats.len()
            + self
                .sub_categories
                .values()
                .map(CategoryTree::total_chats)
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.total_chats() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use warden_shared::ChatKind;

    use super::*;
    use crate::kv::{KvStore, MemoryKv, ScanPage};
    use crate::registry::Registry;

    fn chat(id: i64, title: &str) -> ChatRecord {
        ChatRecord::new(ChatId(id), ChatKind::Supergroup, title)
    }

    fn assignments() -> CategoryAssignments {
        let mut a = CategoryAssignments::default();
        a.assign(ChatId(-1), "Computer Science", Some("First year"));
        a.assign(ChatId(-2), "Computer Science", None);
        a.assign(ChatId(-3), "Art History", None);
        a
    }

    #[test]
    fn uncategorized_chats_stay_at_root_only() {
        let tree = CategoryTree::build(
            vec![chat(-1, "Algorithms"), chat(-2, "CS general"), chat(-9, "Off topic")],
            &assignments(),
        );

        assert_eq!(tree.chats.len(), 1);
        assert_eq!(tree.chats[0].id, ChatId(-9));
        let cs = &tree.sub_categories["Computer Science"];
        assert!(cs.chats.iter().all(|c| c.id != ChatId(-9)));
        assert!(cs.sub_categories["First year"].chats.iter().all(|c| c.id != ChatId(-9)));
        assert_eq!(tree.total_chats(), 3);
    }

    #[test]
    fn uncategorized_bucket_comes_first_then_alphabetical() {
        let tree = CategoryTree::build(
            vec![chat(-1, "b"), chat(-3, "a"), chat(-9, "z"), chat(-8, "c")],
            &assignments(),
        );

        let buckets = tree.buckets();
        assert!(matches!(buckets[0], Bucket::Uncategorized(_)));
        let names: Vec<&str> = buckets
            .iter()
            .filter_map(|b| match b {
                Bucket::Category { name, .. } => Some(*name),
                Bucket::Uncategorized(_) => None,
            })
            .collect();
        assert_eq!(names, vec!["Art History", "Computer Science"]);

        let titles: Vec<&str> = tree.chats.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "z"]);
    }

    #[test]
    fn no_uncategorized_bucket_when_empty() {
        let tree = CategoryTree::build(vec![chat(-3, "Renaissance")], &assignments());
        let buckets = tree.buckets();
        assert_eq!(buckets.len(), 1);
        assert!(matches!(buckets[0], Bucket::Category { name: "Art History", .. }));
        assert_eq!(tree.category_at(0).map(|(n, _)| n), Some("Art History"));
        assert!(tree.category_at(1).is_none());
    }

    #[test]
    fn parses_assignment_file() {
        let parsed = CategoryAssignments::from_json_str(
            r#"{
                "-100": {"category": "Math", "sub_category": "Analysis"},
                "-200": {"category": "Math"},
                "oops": {"category": "Broken"}
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed.get(ChatId(-100)).and_then(|a| a.sub_category.as_deref()),
            Some("Analysis")
        );
    }

    /// Counts scans that start from the beginning of a table.
    struct CountingKv {
        inner: MemoryKv,
        full_scans: AtomicUsize,
    }

    #[async_trait]
    impl KvStore for CountingKv {
        async fn hget(&self, table: &str, field: &str) -> crate::Result<Option<String>> {
            self.inner.hget(table, field).await
        }
        async fn hset(&self, table: &str, field: &str, value: &str) -> crate::Result<()> {
            self.inner.hset(table, field, value).await
        }
        async fn hdel(&self, table: &str, field: &str) -> crate::Result<bool> {
            self.inner.hdel(table, field).await
        }
        async fn hlen(&self, table: &str) -> crate::Result<u64> {
            self.inner.hlen(table).await
        }
        async fn hscan(&self, table: &str, cursor: u64, count: usize) -> crate::Result<ScanPage> {
            if cursor == 0 {
                self.full_scans.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.hscan(table, cursor, count).await
        }
    }

    #[tokio::test]
    async fn tree_is_built_from_one_scan() {
        let kv = Arc::new(CountingKv {
            inner: MemoryKv::new(),
            full_scans: AtomicUsize::new(0),
        });
        let registry = Registry::new(kv.clone());
        for i in 1..=250 {
            registry.upsert(&chat(-i, &format!("chat {i}"))).await.unwrap();
        }
        let mut a = CategoryAssignments::default();
        for i in 1..=250 {
            a.assign(ChatId(-i), &format!("cat {}", i % 7), None);
        }

        let tree = registry.category_tree(&a).await.unwrap();

        assert_eq!(tree.total_chats(), 250);
        assert_eq!(tree.sub_categories.len(), 7);
        assert_eq!(kv.full_scans.load(Ordering::SeqCst), 1);
    }
}
