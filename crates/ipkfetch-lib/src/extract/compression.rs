//! Detection of the compression wrapped around the inner `data.tar` member.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const BZIP2_MAGIC: &[u8] = b"BZh";
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Zstd,
    Bzip2,
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Xz => "xz",
            Compression::Zstd => "zstd",
            Compression::Bzip2 => "bzip2",
        };
        f.write_str(name)
    }
}

impl Compression {
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        if header.starts_with(XZ_MAGIC) {
            Some(Compression::Xz)
        } else if header.starts_with(GZIP_MAGIC) {
            Some(Compression::Gzip)
        } else if header.starts_with(ZSTD_MAGIC) {
            Some(Compression::Zstd)
        } else if header.starts_with(BZIP2_MAGIC) {
            Some(Compression::Bzip2)
        } else if header.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len())
            == Some(TAR_MAGIC)
        {
            Some(Compression::None)
        } else {
            None
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Compression::Gzip)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Compression::Xz)
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(Compression::Zstd)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(Compression::Bzip2)
        } else if name.ends_with(".tar") {
            Some(Compression::None)
        } else {
            None
        }
    }

    /// Sniffs the file contents first and only falls back to the file name
    /// when the header is not recognised.
    pub fn detect(path: &Path) -> io::Result<Option<Self>> {
        let mut header = Vec::with_capacity(TAR_MAGIC_OFFSET + TAR_MAGIC.len());
        File::open(path)?
            .take((TAR_MAGIC_OFFSET + TAR_MAGIC.len()) as u64)
            .read_to_end(&mut header)?;

        Ok(Self::from_magic(&header).or_else(|| Self::from_extension(path)))
    }

    /// Wraps `reader` in the matching decoder.
    pub fn decoder<'a, R: Read + 'a>(self, reader: R) -> io::Result<Box<dyn Read + 'a>> {
        let decoder: Box<dyn Read + 'a> = match self {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
            Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
        };
        Ok(decoder)
    }
}
