//! CLI command modules.

pub mod connections;
pub mod http;
pub mod peers;
pub mod sessions;
pub mod status;
