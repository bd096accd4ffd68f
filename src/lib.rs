pub mod actionlog;
pub mod config;
pub mod error;
pub mod fs;
pub mod server;
pub mod settings;
pub mod util;
