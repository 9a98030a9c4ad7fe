use chrono::{Datelike, Local, NaiveDate};
use sha2::{Digest, Sha256};

use psyhub_protocol::MediaCategory;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Byte range of one chunk. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// 1-based sequence number.
    pub number: u32,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Number of chunks needed for `size` bytes. Never less than one, so an
/// empty file still produces a single (empty) chunk for the merge.
pub fn total_chunks(size: u64, chunk_size: u64) -> u64 {
    if size == 0 {
        1
    } else {
        size.div_ceil(chunk_size.max(1))
    }
}

/// Stable remote grouping key for a file.
///
/// Derived from name and size only, so the same file yields the same key
/// across pause/resume and across manager instances. Uses the first
/// 16 bytes of SHA-256 (32 hex characters).
pub fn file_identifier(filename: &str, size: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(size.to_string().as_bytes());
    hasher.update(b"-");
    hasher.update(filename.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Storage sub-path: `<category>/<yyyy>/<mm>`.
pub fn relative_path(category: MediaCategory, date: NaiveDate) -> String {
    format!("{}/{:04}/{:02}", category, date.year(), date.month())
}

/// Immutable layout of one upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub identifier: String,
    pub filename: String,
    pub media_type: String,
    pub category: MediaCategory,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub relative_path: String,
}

impl ChunkPlan {
    /// Plans a file uploaded on `date`.
    ///
    /// A `chunk_size` of 0 selects [`DEFAULT_CHUNK_SIZE`].
    pub fn new(
        filename: &str,
        total_size: u64,
        media_type: &str,
        chunk_size: u64,
        date: NaiveDate,
    ) -> Result<Self, TransferError> {
        crate::validate_filename(filename)?;

        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let count = total_chunks(total_size, chunk_size);
        let total_chunks = u32::try_from(count).map_err(|_| TransferError::TooManyChunks(count))?;

        let category = MediaCategory::from_mime(media_type);
        let relative_path = relative_path(category, date);
        crate::validate_relative_path(&relative_path)?;

        Ok(Self {
            identifier: file_identifier(filename, total_size),
            filename: filename.to_string(),
            media_type: media_type.to_string(),
            category,
            total_size,
            chunk_size,
            total_chunks,
            relative_path,
        })
    }

    /// Plans a file uploaded today (local time).
    pub fn today(
        filename: &str,
        total_size: u64,
        media_type: &str,
        chunk_size: u64,
    ) -> Result<Self, TransferError> {
        Self::new(
            filename,
            total_size,
            media_type,
            chunk_size,
            Local::now().date_naive(),
        )
    }

    /// Byte range of chunk `number` (1-based).
    pub fn range(&self, number: u32) -> Result<ChunkRange, TransferError> {
        if number == 0 || number > self.total_chunks {
            return Err(TransferError::ChunkOutOfRange(number));
        }
        let start = u64::from(number - 1) * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_size);
        Ok(ChunkRange {
            number,
            start: start.min(self.total_size),
            end,
        })
    }

    /// All chunk numbers in ascending order.
    pub fn chunk_numbers(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.total_chunks
    }

    /// Sum of the byte lengths of the given chunks.
    pub fn bytes_in<'a>(&self, numbers: impl IntoIterator<Item = &'a u32>) -> u64 {
        numbers
            .into_iter()
            .filter_map(|n| self.range(*n).ok())
            .map(|r| r.len())
            .sum()
    }
}
