pub mod api;
pub mod auth;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod startup;
pub mod state;

pub use config::format_diagnostics;
pub use config::Config;
pub use config::Diagnostic;
pub use config::LogLevel;
pub use registry::Switch;
pub use registry::SwitchRegistry;
pub use resolver::Action;
pub use resolver::ActionResolver;
pub use state::SwitchState;
