//! KDL configuration parsing for the sysupgrade build queue.

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    DatabaseConfig, QueueConfig, SystemConfig, WorkerConfig, load_system_config,
    parse_system_config,
};
