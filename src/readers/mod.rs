pub mod json;
pub mod types;
pub mod utils;

pub use json::{JsonReader, write_profiles};
pub use types::{DataReader, FileError, FileType, ReadError};
pub use utils::reader_from_filetype;

use std::path::PathBuf;

pub fn create_reader(file_name: PathBuf) -> Result<Box<dyn DataReader>, FileError> {
    match reader_from_filetype(&file_name) {
        Ok(FileType::Json) => Ok(Box::new(JsonReader { file_name })),
        Err(e) => Err(e),
    }
}
