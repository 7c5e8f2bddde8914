pub mod bundle;
pub mod config;
pub mod error;
pub mod id;
pub mod poller;
pub mod protocol;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CONFIG_VERSION: f32 = 0.1;
