pub mod api;
pub mod bridge;
pub mod content;
pub mod db;
pub mod errors;
pub mod form;
pub mod models;
pub mod notion;
pub mod redaction;
pub mod shell;
pub mod validation;
pub mod vault;

#[cfg(feature = "desktop")]
pub mod desktop;
