pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod gateway;
pub mod mapping;
pub mod merge;
pub mod order;
pub mod storage;
pub mod table;
pub mod telemetry;
pub mod worker;

pub use broadcast::{OrderProgressBroadcaster, OrderProgressEvent, ProgressPhase};
pub use config::{load_config, seed_mapping_config, Config};
pub use db::Database;
pub use error::{
    ConfigError, MergeError, OcrmergeError, OrderError, Result, StorageError, WorkerError,
};
pub use extraction::{ExtractionService, PassthroughExtractor};
pub use gateway::PersistenceGateway;
pub use mapping::{resolve, EffectiveConfig, ItemType, MappingTemplate};
pub use merge::{MatchOptions, MergedTable};
pub use order::{Item, ItemStatus, Order, OrderService, OrderStatus};
pub use storage::{BlobStore, FileStorage};
pub use table::{NormalizeOptions, Normalizer, RowTable};
pub use worker::{ExtractionJob, WorkerPool};
