//! Word-vector container and builder.
//!
//! Word vectors are trained from a newline-delimited corpus with random
//! indexing: every word gets a deterministic random index vector, and its
//! final vector is its own index vector plus the index vectors of words seen
//! within a fixed window, weighted by `1 / distance`.
//!
//! # File Format
//!
//! - Header (20 bytes): magic `WVEC`, version, dimension, word count, flags
//! - Vectors: `count * dimension` contiguous little-endian f32 values
//! - Vocabulary: `count` entries of `u32` byte length followed by UTF-8 bytes,
//!   in vector order

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::WORD_VECTORS_EXTENSION;
use crate::vector::quantize::QuantizedVector;
use crate::vector::{VectorDimension, VectorError, normalize, tokenize};

/// Current container format version.
const FORMAT_VERSION: u32 = 1;

/// Size of the container header in bytes.
const HEADER_SIZE: usize = 20;

/// Magic bytes to identify word-vector files.
const MAGIC_BYTES: &[u8; 4] = b"WVEC";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Co-occurrence window on each side of a word.
const WINDOW: usize = 5;

/// How vectors are materialized on lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
    /// Full-precision vectors as stored.
    #[default]
    Full,
    /// Vectors round-tripped through 8-bit quantization.
    Quantized,
}

/// Memory-mapped word-vector container.
#[derive(Debug)]
pub struct WordVectors {
    path: PathBuf,
    mmap: Mmap,
    dimension: VectorDimension,
    vocabulary: HashMap<String, usize>,
    mode: ReadMode,
}

impl WordVectors {
    /// Trains word vectors from `tokens` (one text per line) and writes a
    /// container next to `output`. Words seen fewer than `min_count` times are
    /// discarded.
    ///
    /// Returns the written path, with the `.wvec` extension appended when missing.
    pub fn build(
        tokens: impl AsRef<Path>,
        dimensions: usize,
        min_count: usize,
        output: impl AsRef<Path>,
    ) -> Result<PathBuf, VectorError> {
        let dimension = VectorDimension::new(dimensions)?;
        let output = container_path(output.as_ref());

        let reader = BufReader::new(File::open(tokens.as_ref())?);
        let mut sentences = Vec::new();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for line in reader.lines() {
            let words = tokenize(&line?);
            for word in &words {
                *counts.entry(word.clone()).or_default() += 1;
            }
            sentences.push(words);
        }

        // BTreeMap keeps the vocabulary order deterministic
        let vocabulary: BTreeMap<&str, usize> = counts
            .iter()
            .filter(|(_, count)| **count >= min_count.max(1))
            .enumerate()
            .map(|(index, (word, _))| (word.as_str(), index))
            .collect();

        let index_vectors: Vec<Vec<f32>> = vocabulary
            .keys()
            .map(|word| index_vector(word, dimension.get()))
            .collect();

        let mut vectors = index_vectors.clone();
        for sentence in &sentences {
            for (position, word) in sentence.iter().enumerate() {
                let Some(&target) = vocabulary.get(word.as_str()) else {
                    continue;
                };
                let start = position.saturating_sub(WINDOW);
                let end = (position + WINDOW + 1).min(sentence.len());
                for (other, neighbor) in sentence.iter().enumerate().take(end).skip(start) {
                    if other == position {
                        continue;
                    }
                    let Some(&source) = vocabulary.get(neighbor.as_str()) else {
                        continue;
                    };
                    let weight = 1.0 / position.abs_diff(other) as f32;
                    for (value, context) in vectors[target].iter_mut().zip(&index_vectors[source]) {
                        *value += weight * context;
                    }
                }
            }
        }
        for vector in vectors.iter_mut() {
            normalize(vector);
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = BufWriter::new(File::create(&output)?);
        write_header(&mut file, dimension, vocabulary.len())?;
        for vector in &vectors {
            for value in vector {
                file.write_all(&value.to_le_bytes())?;
            }
        }
        for word in vocabulary.keys() {
            file.write_all(&(word.len() as u32).to_le_bytes())?;
            file.write_all(word.as_bytes())?;
        }
        file.flush()?;

        tracing::info!(
            "built {} word vectors ({} dimensions) at {}",
            vocabulary.len(),
            dimension.get(),
            output.display()
        );

        Ok(output)
    }

    /// Opens an existing container.
    pub fn open(path: impl AsRef<Path>, mode: ReadMode) -> Result<Self, VectorError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let (version, dimension, count) = read_header(&mmap)?;
        if version != FORMAT_VERSION {
            return Err(VectorError::VersionMismatch {
                expected: FORMAT_VERSION,
                actual: version,
            });
        }

        let mut offset = HEADER_SIZE + count * dimension.get() * BYTES_PER_F32;
        let mut vocabulary = HashMap::with_capacity(count);
        for index in 0..count {
            let length = read_u32(&mmap, offset)
                .ok_or_else(|| truncated("vocabulary length"))? as usize;
            offset += 4;
            let bytes = mmap
                .get(offset..offset + length)
                .ok_or_else(|| truncated("vocabulary entry"))?;
            let word = std::str::from_utf8(bytes)
                .map_err(|e| VectorError::InvalidFormat(format!("Invalid UTF-8 word: {e}")))?;
            vocabulary.insert(word.to_string(), index);
            offset += length;
        }

        tracing::debug!(
            "opened {} word vectors from {}",
            vocabulary.len(),
            path.display()
        );

        Ok(Self {
            path,
            mmap,
            dimension,
            vocabulary,
            mode,
        })
    }

    /// Vector for `word`, or `None` when the word is out of vocabulary.
    #[must_use]
    pub fn lookup(&self, word: &str) -> Option<Vec<f32>> {
        let index = *self.vocabulary.get(word)?;
        let dimension = self.dimension.get();
        let start = HEADER_SIZE + index * dimension * BYTES_PER_F32;
        let bytes = self.mmap.get(start..start + dimension * BYTES_PER_F32)?;

        let vector: Vec<f32> = bytes
            .chunks_exact(BYTES_PER_F32)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        match self.mode {
            ReadMode::Full => Some(vector),
            ReadMode::Quantized => Some(QuantizedVector::quantize(&vector).dequantize()),
        }
    }

    #[must_use]
    pub fn contains(&self, word: &str) -> bool {
        self.vocabulary.contains_key(word)
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    #[must_use]
    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn container_path(output: &Path) -> PathBuf {
    if output
        .extension()
        .is_some_and(|ext| ext == WORD_VECTORS_EXTENSION)
    {
        output.to_path_buf()
    } else {
        let mut name = output.as_os_str().to_os_string();
        name.push(".");
        name.push(WORD_VECTORS_EXTENSION);
        PathBuf::from(name)
    }
}

/// Deterministic random vector for a word, stable across runs and platforms.
fn index_vector(word: &str, dimension: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(fnv1a(word.as_bytes()));
    let mut vector: Vec<f32> = (0..dimension)
        .map(|_| rng.random_range(-1.0f32..1.0))
        .collect();
    normalize(&mut vector);
    vector
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn write_header(
    file: &mut impl Write,
    dimension: VectorDimension,
    count: usize,
) -> Result<(), std::io::Error> {
    file.write_all(MAGIC_BYTES)?;
    file.write_all(&FORMAT_VERSION.to_le_bytes())?;
    file.write_all(&(dimension.get() as u32).to_le_bytes())?;
    file.write_all(&(count as u32).to_le_bytes())?;
    // Flags, reserved
    file.write_all(&0u32.to_le_bytes())?;
    Ok(())
}

fn read_header(mmap: &Mmap) -> Result<(u32, VectorDimension, usize), VectorError> {
    if mmap.len() < HEADER_SIZE {
        return Err(VectorError::InvalidFormat(
            "File too small to contain header".to_string(),
        ));
    }

    // Check magic bytes
    if &mmap[0..4] != MAGIC_BYTES {
        return Err(VectorError::InvalidFormat("Invalid magic bytes".to_string()));
    }

    let version = read_u32(mmap, 4).ok_or_else(|| truncated("version"))?;
    let dimension = VectorDimension::new(read_u32(mmap, 8).ok_or_else(|| truncated("dimension"))? as usize)?;
    let count = read_u32(mmap, 12).ok_or_else(|| truncated("count"))? as usize;

    let vectors_end = HEADER_SIZE + count * dimension.get() * BYTES_PER_F32;
    if mmap.len() < vectors_end {
        return Err(truncated("vectors"));
    }

    Ok((version, dimension, count))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn truncated(section: &str) -> VectorError {
    VectorError::InvalidFormat(format!("File truncated while reading {section}"))
}
