//! CLI command handlers, one per file.

mod probe;
mod resolve;
mod rewrite;
mod status;

pub use probe::run_probe;
pub use resolve::{run_resolve, ResolveArgs};
pub use rewrite::run_rewrite;
pub use status::run_status;
