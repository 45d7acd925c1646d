//! Small helper types shared by the photomap crates.

mod count_by_key;
mod existing_dir;

pub use count_by_key::CountByKey;
pub use existing_dir::ExistingDir;
