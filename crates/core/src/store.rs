//! Flat little-endian page matrix: `i32 rows | i32 cols | rows * cols f32`.

use crate::error::StoreError;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

const HEADER_LEN: usize = 8;
const FLOAT_LEN: usize = std::mem::size_of::<f32>();

/// Non-empty, rectangular, row-major matrix with one row per page.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, StoreError> {
        let cols = rows.first().map(Vec::len).ok_or(StoreError::EmptyMatrix)?;
        if cols == 0 {
            return Err(StoreError::EmptyMatrix);
        }

        let mut data = Vec::with_capacity(rows.len() * cols);
        for (index, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(StoreError::RaggedRows {
                    row: index,
                    expected: cols,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }

        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn from_flat(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, StoreError> {
        if rows == 0 || cols == 0 {
            return Err(StoreError::EmptyMatrix);
        }
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(StoreError::RaggedRows {
                row: data.len() / cols,
                expected: cols,
                found: data.len() % cols,
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.cols)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_rows(self) -> Vec<Vec<f32>> {
        self.data
            .chunks_exact(self.cols)
            .map(<[f32]>::to_vec)
            .collect()
    }
}

pub struct EmbeddingStore;

impl EmbeddingStore {
    /// Writes the matrix, replacing whatever the file held before.
    pub fn save(matrix: &EmbeddingMatrix, path: &Path) -> Result<(), StoreError> {
        if path.as_os_str().is_empty() {
            return Err(StoreError::InvalidPath);
        }

        let too_large = || StoreError::TooLarge {
            rows: matrix.rows(),
            cols: matrix.cols(),
        };
        let rows = i32::try_from(matrix.rows()).map_err(|_| too_large())?;
        let cols = i32::try_from(matrix.cols()).map_err(|_| too_large())?;

        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&rows.to_le_bytes())?;
        writer.write_all(&cols.to_le_bytes())?;
        for value in matrix.as_slice() {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()?;

        debug!(path = %path.display(), rows, cols, "embedding matrix saved");
        Ok(())
    }

    /// Maps the file read-only and decodes it in place. Falls back to a
    /// buffered read when the platform refuses the mapping.
    pub fn load(path: &Path) -> Result<EmbeddingMatrix, StoreError> {
        if path.as_os_str().is_empty() {
            return Err(StoreError::InvalidPath);
        }

        let file = File::open(path)?;
        if file.metadata()?.len() < HEADER_LEN as u64 {
            return Err(StoreError::CorruptStore(format!(
                "{} is shorter than the {HEADER_LEN}-byte header",
                path.display()
            )));
        }

        // SAFETY: the mapping is read-only and dropped before returning; the
        // decoded matrix owns a copy of the data.
        match unsafe { Mmap::map(&file) } {
            Ok(mapped) => decode(&mapped),
            Err(error) => {
                debug!(path = %path.display(), %error, "mmap unavailable, reading into memory");
                drop(file);
                Self::load_buffered(path)
            }
        }
    }

    pub fn load_buffered(path: &Path) -> Result<EmbeddingMatrix, StoreError> {
        if path.as_os_str().is_empty() {
            return Err(StoreError::InvalidPath);
        }
        let bytes = std::fs::read(path)?;
        decode(&bytes)
    }
}

fn decode(bytes: &[u8]) -> Result<EmbeddingMatrix, StoreError> {
    let header = bytes.get(..HEADER_LEN).ok_or_else(|| {
        StoreError::CorruptStore(format!(
            "{} bytes cannot hold the {HEADER_LEN}-byte header",
            bytes.len()
        ))
    })?;
    let rows = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let cols = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if rows <= 0 || cols <= 0 {
        return Err(StoreError::CorruptStore(format!(
            "invalid shape {rows}x{cols}"
        )));
    }

    let (rows, cols) = (rows as usize, cols as usize);
    let payload_len = rows
        .checked_mul(cols)
        .and_then(|count| count.checked_mul(FLOAT_LEN))
        .ok_or_else(|| StoreError::CorruptStore(format!("shape {rows}x{cols} overflows")))?;

    let end = HEADER_LEN.saturating_add(payload_len);
    let payload = bytes.get(HEADER_LEN..end).ok_or_else(|| {
        StoreError::CorruptStore(format!(
            "shape {rows}x{cols} needs {end} bytes, file has {}",
            bytes.len()
        ))
    })?;

    let data = payload
        .chunks_exact(FLOAT_LEN)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    EmbeddingMatrix::from_flat(rows, cols, data)
}
