//! CLI command handlers, one file per command.

mod active;
mod cancel;
mod clean;
mod dir;
mod download;
mod list;

pub use active::run_active;
pub use cancel::run_cancel;
pub use clean::run_clean;
pub use dir::run_dir;
pub use download::run_download;
pub use list::run_list;
