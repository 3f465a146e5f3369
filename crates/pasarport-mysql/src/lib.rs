//! MySQL collaborators: the Marzneshin source extractor and the PasarGuard
//! target store, both over a single `sqlx` connection.

pub mod connect;
pub mod decode;
pub mod extract;
pub mod introspect;
pub mod target;

pub use connect::{DatabaseConfig, connect, store_error};
pub use extract::{DEFAULT_MAX_USAGE_ROWS, MySqlSourceExtractor};
pub use target::MySqlTargetStore;
