mod parser;
mod types;

pub use parser::{INDEX_FILE_NAME, PackageIndex, Resolution, index_url, resolve_jobs, resolve_url};
pub use types::{IndexError, IndexRecord, PackageName};
