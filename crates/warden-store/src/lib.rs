//! # warden-store
//!
//! Persistent state of the Warden bot, kept in a hash-table key-value store.
//!
//! The crate exposes the [`KvStore`] interface with a SQLite backend
//! ([`SqliteKv`]) and an in-memory one ([`MemoryKv`]), the chatroom
//! [`Registry`] built on top of it, and the [`CategoryTree`] directory view.

pub mod category;
pub mod kv;
pub mod migrations;
pub mod registry;
pub mod sqlite;

mod error;

pub use category::{Bucket, CategoryAssignment, CategoryAssignments, CategoryTree};
pub use error::{Result, StoreError};
pub use kv::{KvStore, MemoryKv, ScanPage};
pub use registry::Registry;
pub use sqlite::SqliteKv;
