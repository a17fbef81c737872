mod admin_auth;
mod requests_logging;

pub use admin_auth::require_admin_token;
pub use requests_logging::{log_requests, RequestsLoggingLevel};
