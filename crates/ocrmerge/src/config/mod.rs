pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, seed_mapping_config, SeedSummary};
pub use schema::{Config, DefaultBinding, MappingSection};
