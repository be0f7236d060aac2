//! Configuration: schema + loader.

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, get_data_path, load_config, save_config};
pub use schema::{
    BreakerConfig, BudgetConfig, CacheConfig, CeilingSet, ExperimentConfig, LimitsConfig,
    OxigateConfig, ProviderSettings, WindowKind,
};
