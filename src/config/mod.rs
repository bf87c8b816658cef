pub mod schema;

pub use schema::{
    ApiConfig, Config, FallbackConfig, ObservabilityConfig, ReliabilityConfig, SyntheticConfig,
};
