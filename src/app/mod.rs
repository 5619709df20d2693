// Gateway module for app - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod config;
mod context;

// Public re-exports - the ONLY way to access app functionality
pub use config::{
    default_config_path, load_config, persist_report_passwords, save_config, GatewayConfig,
};
pub use context::AppContext;
