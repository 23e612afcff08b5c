//! Silt - the storage-engine core of a disk-oriented database
//!
//! This crate implements the paged data layer that everything above a query
//! engine sits on: pages live on a block-addressed file, a fixed-size buffer
//! pool caches them in memory, and a concurrent B+ tree index maps fixed-width
//! keys to record ids.
//!
//! # Architecture
//!
//! - **Storage layer** (`storage`): synchronous page I/O
//!   - `DiskManager`: reads/writes 4 KB pages of a single database file
//!   - `DiskScheduler`: background I/O worker fed over a channel
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: pins pages into frames, evicts with LRU-K
//!   - `LruKReplacer`: backward-k-distance victim selection
//!   - `Page`: one frame's bytes plus pin count, dirty flag and latch
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pin + latch
//!
//! - **Containers** (`container`):
//!   - `ExtendibleHashTable`: the buffer pool's page table, usable standalone
//!
//! - **Index** (`index`): ordered key/record-id mapping
//!   - `BPlusTree`: latch-crabbed lookup/insert/delete and ordered scans
//!   - `GenericKey`/`IntegerComparator`: fixed-width keys
//!   - `HeaderPage`: persists index-name to root-page-id records on page 0
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use silt::buffer::BufferPoolManager;
//! use silt::common::Rid;
//! use silt::index::{BPlusTree, GenericKey, IntegerComparator};
//! use silt::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(100, 2, disk_manager));
//!
//! let tree: BPlusTree<GenericKey<8>, IntegerComparator> =
//!     BPlusTree::new("orders_pk", bpm, IntegerComparator, 64, 64).unwrap();
//!
//! tree.insert(&GenericKey::from_integer(42), Rid::new(1, 0)).unwrap();
//! assert!(tree.get_value(&GenericKey::from_integer(42)).unwrap().is_some());
//! for (key, rid) in tree.iter().unwrap() {
//!     println!("{:?} -> {}", key, rid);
//! }
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FrameId, PageId, Result, Rid, SiltError};
