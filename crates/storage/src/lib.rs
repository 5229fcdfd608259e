pub mod comment;
pub mod error;
mod file;
mod path;
mod target;

pub use crate::comment::{CommentHandle, CommentWriter};
pub use crate::file::{FileInfo, extension_of};
pub use crate::path::{MAX_FILE_NAME_BYTES, validate_file_name};
pub use crate::target::WatchTarget;
