mod b_plus_tree;
mod btree_page;
mod generic_key;
mod header_page;
mod index_iterator;
mod internal_page;
mod leaf_page;

pub use b_plus_tree::BPlusTree;
pub use btree_page::{BTreePageKind, BTreePageMut, BTreePageRef};
pub use generic_key::{GenericKey, IndexKey, IntegerComparator, KeyComparator};
pub use header_page::{HeaderPageMut, HeaderPageRef};
pub use index_iterator::IndexIterator;
pub use internal_page::{InternalPageMut, InternalPageRef};
pub use leaf_page::{LeafPageMut, LeafPageRef};
