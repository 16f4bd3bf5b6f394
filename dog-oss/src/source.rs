use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::{OssError, OssResult};

/// Random-access, read-only object content.
///
/// Concurrent part uploads call `read_range` in parallel, so there must be no
/// shared read cursor between calls.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Total size in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `length` bytes starting at `offset`
    async fn read_range(&self, offset: u64, length: u64) -> OssResult<Bytes>;
}

fn check_bounds(offset: u64, length: u64, total: u64) -> OssResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= total => Ok(()),
        _ => Err(OssError::invalid(format!(
            "range {}+{} is outside a {} byte source",
            offset, length, total
        ))),
    }
}

/// In-memory content
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: Bytes,
}

impl BytesSource {
    pub fn new<B: Into<Bytes>>(data: B) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl DataSource for BytesSource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, offset: u64, length: u64) -> OssResult<Bytes> {
        check_bounds(offset, length, self.len())?;
        Ok(self.data.slice(offset as usize..(offset + length) as usize))
    }
}

/// A local file; every read opens its own handle
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    pub async fn open<P: AsRef<Path>>(path: P) -> OssResult<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(OssError::invalid(format!("{} is not a file", path.display())));
        }
        Ok(Self {
            path,
            len: meta.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DataSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, offset: u64, length: u64) -> OssResult<Bytes> {
        check_bounds(offset, length, self.len)?;
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; length as usize];
        // read_exact surfaces a file truncated since `open` as UnexpectedEof
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
