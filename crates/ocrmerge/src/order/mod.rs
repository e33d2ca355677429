//! Orders, items and the workflow that drives them.

pub mod machine;
pub mod model;
pub mod service;

pub use machine::{
    ensure_transition, require_status, rollup_target, validate_mapping_keys, RollupFacts,
    MAX_MAPPING_KEYS,
};
pub use model::{
    ExtractionOutcome, ExtractionResult, FileRef, FileRole, Item, ItemParts, ItemStatus, Order,
    OrderStatus,
};
pub use service::OrderService;
