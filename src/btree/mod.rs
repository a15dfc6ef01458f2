pub mod page;
pub mod tree;

pub use page::{decode_page, RawIndexEntry, RawLeafEntry, RawPage};
pub use tree::BTree;
