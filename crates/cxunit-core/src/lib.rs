pub mod config;
pub mod error;
pub mod path;
pub mod types;
pub mod unsaved;

pub use config::{BackendConfig, ConfigError, ConfigManager, CxUnitConfig, LoggingConfig};
pub use error::*;
pub use path::*;
pub use types::*;
pub use unsaved::*;
