pub mod app;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod cognos;
pub mod constants;
pub mod convert;
pub mod gateway;
pub mod server;
pub mod utils;

pub use app::{load_config, AppContext, GatewayConfig};
pub use gateway::{Gateway, GatewayResponse, LogicalPath, ReportRequest};
pub use utils::GatewayError;
