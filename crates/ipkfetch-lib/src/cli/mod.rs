mod args;
mod params;
mod resolve;
mod resolved_command;
mod sync;

pub use args::{Args, Command, parse_args};
pub use params::{ResolveParams, SyncParams};
pub use resolve::run_resolve;
pub use resolved_command::{ResolvedCommand, default_root, resolve_command};
pub use sync::run_sync;
