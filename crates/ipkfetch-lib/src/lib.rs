pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod index;
pub mod links;
pub mod sync;

pub use config::Config;
pub use error::IpkFetchError;
