//! Join configuration: templates, defaults, resolution and mapping files.

pub mod headers;
pub mod resolver;
pub mod template;

pub use headers::{list_headers, list_headers_in, SheetHeaders};
pub use resolver::{resolve, select_template, MappingSource, ScopeTier};
pub use template::{
    ConfigOrigin, EffectiveConfig, ItemType, MappingConfig, MappingConfigOverride,
    MappingDefault, MappingTemplate,
};
