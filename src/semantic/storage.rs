//! Binary storage for the bookmark vector index.
//!
//! File format: vectors.bin, inside the index directory
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - source_len: u32, source: [u8; source_len] (UTF-8 url)
//! - text_len: u32, text: [u8; text_len] (UTF-8 document text)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::{IndexError, IndexedDocument, VectorIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Name of the vectors file inside the index directory
pub const VECTORS_FILE: &str = "vectors.bin";

/// Upper bound for a single stored string, anything larger means corruption.
const MAX_FIELD_LEN: u32 = 16 * 1024 * 1024;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Storage manager for the vector index of one directory.
pub struct VectorStorage {
    dir: PathBuf,
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(VECTORS_FILE);
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the vector index from storage.
    ///
    /// Fails when the file was written by another model or with other
    /// dimensions than expected.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        Self::validate_header(&header, expected_model_id, expected_dimensions)?;

        let dimensions = header.dimensions as usize;
        // an entry takes at least its two length prefixes and the vector
        let min_entry_size = 8 + 4 * dimensions as u64;
        let capacity = header.entry_count.min(file_len / min_entry_size) as usize;
        let mut index = VectorIndex::with_capacity(dimensions, capacity);

        for _ in 0..header.entry_count {
            let document = Self::read_entry(&mut reader, dimensions)?;
            if !index.insert(document.source, document.text, document.embedding)? {
                return Err(VectorStorageError::InvalidFormat(
                    "duplicate source in index file".to_string(),
                ));
            }
        }

        Ok(index)
    }

    /// Save the vector index to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        std::fs::create_dir_all(&self.dir)?;

        let temp_path = self.path.with_extension("tmp");

        let result = Self::write_to_file(&temp_path, index, model_id);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn write_to_file(
        path: &Path,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
            VectorStorageError::InvalidFormat(format!(
                "{} dimensions do not fit the file format",
                index.dimensions()
            ))
        })?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions,
            entry_count: index.len() as u64,
        };
        Self::write_header(&mut writer, &header)?;

        for document in index.iter() {
            Self::write_entry(&mut writer, document)?;
        }

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(reader: &mut impl Read) -> Result<Header, VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                VectorStorageError::InvalidFormat("file is shorter than the header".to_string())
            }
            _ => e.into(),
        })?;

        let version = header_bytes[0];
        if version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes([
            header_bytes[43],
            header_bytes[44],
            header_bytes[45],
            header_bytes[46],
        ]);
        if stored_checksum != crc32fast::hash(&header_bytes[0..43]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[1..33]);

        let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);

        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header_bytes[35..43]);
        let entry_count = u64::from_le_bytes(count_bytes);

        Ok(Header {
            version,
            model_id,
            dimensions,
            entry_count,
        })
    }

    fn validate_header(
        header: &Header,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<(), VectorStorageError> {
        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }

        if header.dimensions as usize != expected_dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        Ok(())
    }

    fn write_header(writer: &mut impl Write, header: &Header) -> Result<(), VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1..33].copy_from_slice(&header.model_id);
        header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[0..43]);
        header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_entry(
        reader: &mut impl Read,
        dimensions: usize,
    ) -> Result<IndexedDocument, VectorStorageError> {
        let source = Self::read_string(reader)?;
        let text = Self::read_string(reader)?;

        let mut embedding = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let mut float_bytes = [0u8; 4];
            reader.read_exact(&mut float_bytes)?;
            embedding.push(f32::from_le_bytes(float_bytes));
        }

        Ok(IndexedDocument {
            source,
            text,
            embedding,
        })
    }

    fn write_entry(
        writer: &mut impl Write,
        document: &IndexedDocument,
    ) -> Result<(), VectorStorageError> {
        Self::write_string(writer, &document.source)?;
        Self::write_string(writer, &document.text)?;

        for &value in &document.embedding {
            writer.write_all(&value.to_le_bytes())?;
        }

        Ok(())
    }

    fn read_string(reader: &mut impl Read) -> Result<String, VectorStorageError> {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_FIELD_LEN {
            return Err(VectorStorageError::InvalidFormat(format!(
                "field length {len} exceeds limit"
            )));
        }

        let mut bytes = vec![0u8; len as usize];
        reader.read_exact(&mut bytes)?;

        String::from_utf8(bytes)
            .map_err(|_| VectorStorageError::InvalidFormat("field is not valid utf8".to_string()))
    }

    fn write_string(writer: &mut impl Write, value: &str) -> Result<(), VectorStorageError> {
        let len = u32::try_from(value.len())
            .ok()
            .filter(|len| *len <= MAX_FIELD_LEN)
            .ok_or_else(|| VectorStorageError::InvalidFormat("field too long".to_string()))?;

        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(value.as_bytes())?;
        Ok(())
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}
