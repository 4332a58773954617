pub mod config;
pub mod patcher;
pub mod utils;

pub use config::{ConfigDocument, Origin};
pub use patcher::{patch_document, patch_file, PatchOutcome, PatchReport, Rule};
