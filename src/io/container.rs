//! Packed record format.
//!
//! ```text
//! [0..4)    magic b"STPK"
//! [4..8)    format version, u32 LE
//! [8..16)   header length, u64 LE
//! [16..)    JSON header, space-padded so the data section is 64-byte aligned
//! data      int16 LE arrays, row-major, each starting on a 64-byte boundary
//! ```
//!
//! Array offsets in the header are absolute file offsets, so a reader can
//! memory-map the file and slice arrays out directly.

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{PackError, Result};

pub const MAGIC: &[u8; 4] = b"STPK";
pub const FORMAT_VERSION: u32 = 1;
pub const RECORD_EXTENSION: &str = "stpk";
pub const ALIGNMENT: usize = 64;
/// Longest track name stored in the `audio_name` attribute, in bytes.
pub const MAX_NAME_BYTES: usize = 100;

const PREAMBLE_LEN: usize = 16;
const DTYPE_I16: &str = "int16";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayEntry {
    pub name: String,
    pub dtype: String,
    pub shape: [usize; 2],
    pub offset: u64,
    pub length: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub audio_name: String,
    pub sample_rate: u32,
    pub arrays: Vec<ArrayEntry>,
}

/// Arrays staged in memory until the whole record is written at once.
#[derive(Debug)]
pub struct RecordBuilder {
    audio_name: String,
    sample_rate: u32,
    arrays: Vec<(String, Array2<i16>)>,
}

fn align_up(n: usize) -> usize {
    n.div_ceil(ALIGNMENT) * ALIGNMENT
}

/// Truncates `name` to at most [`MAX_NAME_BYTES`] on a char boundary.
pub fn clamp_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_BYTES {
        return name;
    }
    let mut end = MAX_NAME_BYTES;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

impl RecordBuilder {
    pub fn new(audio_name: &str, sample_rate: u32) -> Self {
        Self {
            audio_name: clamp_name(audio_name).to_string(),
            sample_rate,
            arrays: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, data: Array2<i16>) {
        self.arrays.push((name.into(), data));
    }

    /// Lays out the header: every array gets an aligned absolute offset.
    fn header(&self) -> Result<(RecordHeader, usize)> {
        // Offsets depend on the header length, which depends on the offsets'
        // digits; iterate until the padded size is stable.
        let mut data_start = align_up(PREAMBLE_LEN);
        loop {
            let mut cursor = data_start;
            let arrays = self
                .arrays
                .iter()
                .map(|(name, data)| {
                    let length = (data.len() * 2) as u64;
                    let entry = ArrayEntry {
                        name: name.clone(),
                        dtype: DTYPE_I16.into(),
                        shape: [data.nrows(), data.ncols()],
                        offset: cursor as u64,
                        length,
                    };
                    cursor = align_up(cursor + length as usize);
                    entry
                })
                .collect();
            let header = RecordHeader {
                audio_name: self.audio_name.clone(),
                sample_rate: self.sample_rate,
                arrays,
            };
            let json_len = serde_json::to_vec(&header)?.len();
            let needed = align_up(PREAMBLE_LEN + json_len);
            if needed <= data_start {
                return Ok((header, data_start));
            }
            data_start = needed;
        }
    }

    fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let (header, data_start) = self.header()?;
        let mut json = serde_json::to_vec(&header)?;
        json.resize(data_start - PREAMBLE_LEN, b' ');

        out.write_all(MAGIC)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;
        out.write_all(&(json.len() as u64).to_le_bytes())?;
        out.write_all(&json)?;

        let mut written = data_start;
        for ((_, data), entry) in self.arrays.iter().zip(&header.arrays) {
            let pad = entry.offset as usize - written;
            out.write_all(&vec![0u8; pad])?;
            for &s in data.iter() {
                out.write_all(&s.to_le_bytes())?;
            }
            written = entry.offset as usize + entry.length as usize;
        }
        out.flush()?;
        Ok(())
    }

    /// Writes the record to `dest` through a temporary file in the same
    /// directory, renamed into place only once fully written.
    pub fn write_atomic(&self, dest: &Path) -> Result<()> {
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| PackError::io(dir, e))?;

        let tmp = NamedTempFile::new_in(dir).map_err(|e| PackError::io(dir, e))?;
        {
            let mut w = BufWriter::new(tmp.as_file());
            self.write_to(&mut w)?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| PackError::io(tmp.path(), e))?;
        // Dropping `tmp` on any earlier return removes the partial file.
        tmp.persist(dest).map_err(|e| PackError::io(dest, e.error))?;
        Ok(())
    }
}

/// A record read back from disk.
#[derive(Debug)]
pub struct PackedRecord {
    path: PathBuf,
    header: RecordHeader,
    bytes: Vec<u8>,
}

impl PackedRecord {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path).map_err(|e| PackError::io(&path, e))?;
        let bad = |reason: &str| PackError::container(&path, reason);

        if bytes.len() < PREAMBLE_LEN || &bytes[..4] != MAGIC {
            return Err(bad("not a packed record"));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(bad(&format!("unsupported format version {version}")));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[8..16]);
        let header_len = u64::from_le_bytes(len_bytes) as usize;
        let header_end = PREAMBLE_LEN
            .checked_add(header_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| bad("header extends past end of file"))?;

        let header: RecordHeader = serde_json::from_slice(&bytes[PREAMBLE_LEN..header_end])
            .map_err(|e| bad(&format!("bad header: {e}")))?;

        for entry in &header.arrays {
            if entry.dtype != DTYPE_I16 {
                return Err(bad(&format!("`{}` has dtype {}", entry.name, entry.dtype)));
            }
            let expected = entry.shape[0]
                .checked_mul(entry.shape[1])
                .and_then(|n| n.checked_mul(2))
                .map(|n| n as u64);
            let end = entry.offset.checked_add(entry.length);
            if expected != Some(entry.length) || end.map_or(true, |e| e > bytes.len() as u64) {
                return Err(bad(&format!("`{}` is truncated or mis-sized", entry.name)));
            }
        }

        Ok(Self {
            path,
            header,
            bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn audio_name(&self) -> &str {
        &self.header.audio_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.header.sample_rate
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.header.arrays.iter().map(|a| a.name.as_str())
    }

    pub fn array(&self, name: &str) -> Option<Array2<i16>> {
        let entry = self.header.arrays.iter().find(|a| a.name == name)?;
        let start = entry.offset as usize;
        let raw = &self.bytes[start..start + entry.length as usize];
        let samples: Vec<i16> = raw
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Array2::from_shape_vec((entry.shape[0], entry.shape[1]), samples).ok()
    }
}
