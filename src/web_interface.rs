// Web Interface module root
pub mod routes;
pub mod types;
pub mod web_server;

// Re-export commonly used items
pub use routes::{parse_caller, status_for, CALLER_HEADER};
pub use web_server::WebServer;
