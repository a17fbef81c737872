mod backup_routes;
pub mod backups;
pub mod config;
mod http_layers;
pub mod metrics;
pub mod server;
pub mod state;

pub use backup_routes::ErrorResponse;
pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
