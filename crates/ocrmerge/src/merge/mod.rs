//! Merge/join engine.

pub mod engine;
pub mod keys;

pub use engine::{
    apply_aliases, merge, MergedTable, JOIN_KEY_COLUMN, JOIN_VALUE_COLUMN, UNMATCHED,
};
pub use keys::{KeyIndex, MatchOptions};
