use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// A local file cut into upload chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlices {
    pub path: PathBuf,
    /// Name sent to the backend; may carry a relative directory.
    pub name: String,
    /// Size recorded when the file was sliced.
    pub size: u64,
    pub slices: Vec<Range<u64>>,
}

impl FileSlices {
    pub fn from_path(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        chunk_size: u64,
    ) -> io::Result<Self> {
        if chunk_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "chunk size must be positive",
            ));
        }
        let path = path.into();
        let meta = std::fs::metadata(&path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let size = meta.len();
        Ok(Self {
            path,
            name: name.into(),
            size,
            slices: slice_ranges(size, chunk_size),
        })
    }

    pub fn total_chunks(&self) -> usize {
        self.slices.len()
    }
}

/// Consecutive ranges of at most `chunk_size` bytes covering `0..size`.
/// An empty file still gets one empty range.
pub fn slice_ranges(size: u64, chunk_size: u64) -> Vec<Range<u64>> {
    if size == 0 || chunk_size == 0 {
        return vec![0..0];
    }
    let mut ranges = Vec::with_capacity(size.div_ceil(chunk_size) as usize);
    let mut start = 0;
    while start < size {
        let end = (start + chunk_size).min(size);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

pub async fn read_chunk(path: &Path, range: Range<u64>) -> io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(io::SeekFrom::Start(range.start)).await?;
    let mut buf = vec![0u8; (range.end - range.start) as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn checksum_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// First file that vanished or changed size since it was sliced.
pub async fn find_changed_file(files: &[FileSlices]) -> Option<&FileSlices> {
    for file in files {
        match tokio::fs::metadata(&file.path).await {
            Ok(meta) if meta.is_file() && meta.len() == file.size => {}
            _ => return Some(file),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_cover_file_without_gaps() {
        assert_eq!(slice_ranges(250, 100), vec![0..100, 100..200, 200..250]);
        assert_eq!(slice_ranges(200, 100), vec![0..100, 100..200]);
        assert_eq!(slice_ranges(5, 100), vec![0..5]);
    }

    #[test]
    fn empty_file_has_one_empty_chunk() {
        assert_eq!(slice_ranges(0, 100), vec![0..0]);
    }

    #[test]
    fn checksum_matches_known_vector() {
        assert_eq!(
            checksum_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
