mod archive;
mod compression;

pub use archive::{
    ArchiveExtractor, ExtractError, ExtractOptions, ExtractedPayload, PAYLOAD_MEMBER_PREFIX,
};
pub use compression::Compression;

#[cfg(test)]
pub(crate) use archive::test_support;
