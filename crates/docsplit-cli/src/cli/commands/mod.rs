//! CLI command handlers, one per file.

mod check;
mod history;
mod list;
mod phase;
mod resume;
mod status;
mod submit;

pub use check::run_check;
pub use history::run_history;
pub use list::run_list;
pub use phase::{run_retry, run_start};
pub use resume::run_resume;
pub use status::run_status;
pub use submit::run_submit;
