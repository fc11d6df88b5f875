//! Memory-mapped vector storage for the nearest-neighbor index.
//!
//! # Storage Format
//!
//! - Header (20 bytes): magic `EVEC`, version, dimension, record count, flags
//!   (bit 0 set when vectors are quantized)
//! - Records, fixed size: row id (u32), tombstone (u8), then either
//!   `dimension` little-endian f32 values, or an f32 scale followed by
//!   `dimension` i8 codes

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::types::RowId;
use crate::vector::{QuantizedVector, StoredVector, VectorDimension, VectorError};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 20;

/// Magic bytes to identify vector storage files.
const MAGIC_BYTES: &[u8; 4] = b"EVEC";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Number of bytes per row id (u32).
const BYTES_PER_ID: usize = 4;

const FLAG_QUANTIZED: u32 = 1;

/// A stored vector and its tombstone flag.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub vector: StoredVector,
    pub deleted: bool,
}

/// Read-only view of a saved vector file.
#[derive(Debug)]
pub struct MmapVectorStorage {
    path: PathBuf,
    mmap: Mmap,
    dimension: VectorDimension,
    vector_count: usize,
    quantized: bool,
}

impl MmapVectorStorage {
    /// Writes every entry, tombstones included, to `path`.
    pub fn write(
        path: impl AsRef<Path>,
        dimension: VectorDimension,
        quantized: bool,
        entries: &BTreeMap<RowId, VectorEntry>,
    ) -> Result<(), VectorError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(MAGIC_BYTES)?;
        file.write_all(&STORAGE_VERSION.to_le_bytes())?;
        file.write_all(&(dimension.get() as u32).to_le_bytes())?;
        file.write_all(&(entries.len() as u32).to_le_bytes())?;
        let flags = if quantized { FLAG_QUANTIZED } else { 0 };
        file.write_all(&flags.to_le_bytes())?;

        for (row, entry) in entries {
            if entry.vector.dimension() != dimension.get() {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension.get(),
                    actual: entry.vector.dimension(),
                });
            }

            file.write_all(&row.to_bytes())?;
            file.write_all(&[u8::from(entry.deleted)])?;
            match (&entry.vector, quantized) {
                (StoredVector::Quantized(q), true) => {
                    file.write_all(&q.scale.to_le_bytes())?;
                    let codes: Vec<u8> = q.codes.iter().map(|c| *c as u8).collect();
                    file.write_all(&codes)?;
                }
                (StoredVector::Full(v), false) => {
                    for value in v {
                        file.write_all(&value.to_le_bytes())?;
                    }
                }
                _ => {
                    return Err(VectorError::Serialization(format!(
                        "row {row} precision does not match the index quantization setting"
                    )));
                }
            }
        }

        file.flush()?;
        Ok(())
    }

    /// Opens and validates a saved vector file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VectorError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        if mmap.len() < HEADER_SIZE {
            return Err(VectorError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }
        if &mmap[0..4] != MAGIC_BYTES {
            return Err(VectorError::InvalidFormat("Invalid magic bytes".to_string()));
        }

        let version = read_u32(&mmap, 4);
        if version != STORAGE_VERSION {
            return Err(VectorError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: version,
            });
        }

        let dimension = VectorDimension::new(read_u32(&mmap, 8) as usize)?;
        let vector_count = read_u32(&mmap, 12) as usize;
        let quantized = read_u32(&mmap, 16) & FLAG_QUANTIZED != 0;

        let expected = HEADER_SIZE + vector_count * record_size(dimension, quantized);
        if mmap.len() != expected {
            return Err(VectorError::InvalidFormat(format!(
                "Expected {expected} bytes for {vector_count} vectors, found {}",
                mmap.len()
            )));
        }

        Ok(Self {
            path,
            mmap,
            dimension,
            vector_count,
            quantized,
        })
    }

    /// Decodes every record.
    pub fn read_all_vectors(&self) -> BTreeMap<RowId, VectorEntry> {
        let dimension = self.dimension.get();
        let size = record_size(self.dimension, self.quantized);

        (0..self.vector_count)
            .map(|index| {
                let offset = HEADER_SIZE + index * size;
                let row = RowId::new(read_u32(&self.mmap, offset));
                let deleted = self.mmap[offset + BYTES_PER_ID] != 0;
                let data = offset + BYTES_PER_ID + 1;

                let vector = if self.quantized {
                    let scale = read_f32(&self.mmap, data);
                    let codes = self.mmap[data + BYTES_PER_F32..data + BYTES_PER_F32 + dimension]
                        .iter()
                        .map(|b| *b as i8)
                        .collect();
                    StoredVector::Quantized(QuantizedVector { scale, codes })
                } else {
                    StoredVector::Full(
                        (0..dimension)
                            .map(|i| read_f32(&self.mmap, data + i * BYTES_PER_F32))
                            .collect(),
                    )
                };

                (row, VectorEntry { vector, deleted })
            })
            .collect()
    }

    #[must_use]
    pub fn vector_count(&self) -> usize {
        self.vector_count
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn is_quantized(&self) -> bool {
        self.quantized
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn record_size(dimension: VectorDimension, quantized: bool) -> usize {
    let data = if quantized {
        BYTES_PER_F32 + dimension.get()
    } else {
        dimension.get() * BYTES_PER_F32
    };
    BYTES_PER_ID + 1 + data
}

// Callers validate lengths before reading.
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(bytes, offset))
}
