//! Row conversion from the Marzneshin layout to the PasarGuard layout.
//!
//! Column mapping, named value transforms, computed columns, core config
//! derivation from inbounds, and the required-column check all live here.

pub mod computed;
pub mod converter;
pub mod core_config;
pub mod credentials;
pub mod errors;
pub mod required;
pub mod transforms;

pub use converter::{ConversionOutcome, RowTransformer};
pub use core_config::build_core_config;
pub use credentials::ProxyCredentials;
pub use errors::TransformError;
pub use required::{RequiredOutcome, validate_required};
