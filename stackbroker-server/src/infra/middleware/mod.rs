pub mod api_version;
pub mod basic_auth;

pub use api_version::{API_VERSION_HEADER, MIN_API_VERSION, require_api_version};
pub use basic_auth::require_basic_auth;
