pub mod error;
pub mod fs;

pub use error::PatchError;
pub use fs::write_atomic;
