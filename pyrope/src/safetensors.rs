//! Memory-mapped safetensors container reader.
//!
//! Container layout: an 8-byte little-endian header length `H`,
//! `H` bytes of JSON mapping tensor names to `{dtype, shape,
//! data_offsets}`, then the raw data section. Offsets are relative
//! to the start of the data section, not the file.
//!
//! The reader never copies weight bytes: every [`TensorView`] it
//! hands out borrows the mapping directly and is lifetime-bound to
//! the reader.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde::Deserialize;

use crate::dtype::DType;
use crate::tensor::TensorView;
use crate::{Error, Result};

/// Header descriptor for one named tensor.
///
/// `offset` and `len` are byte positions within the data section;
/// the dtype is kept as the raw header string so that unsupported
/// types are reported at access time instead of being remapped.
#[derive(Debug, Clone)]
pub struct SafeTensorInfo {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub offset: usize,
    pub len: usize,
}

#[derive(Deserialize)]
struct RawEntry {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

/// Read-only view of a safetensors file.
pub struct SafeTensorReader {
    mmap: Mmap,
    data_start: usize,
    tensors: HashMap<String, SafeTensorInfo>,
}

impl SafeTensorReader {
    /// Map `path` read-only and parse the container header.
    ///
    /// # Errors
    /// `Io` if the file cannot be opened or mapped;
    /// `MalformedContainer` if the file is shorter than 8 bytes, the
    /// header length exceeds the file, the JSON cannot be parsed, or
    /// any entry's offsets fall outside the data section.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < 8 {
            return Err(Error::MalformedContainer(
                "file is shorter than the 8-byte header length".into(),
            ));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&mmap[..8]);
        let header_len = usize::try_from(u64::from_le_bytes(len_bytes))
            .map_err(|_| Error::MalformedContainer("header length overflows usize".into()))?;
        let data_start = 8usize
            .checked_add(header_len)
            .filter(|&end| end <= mmap.len())
            .ok_or_else(|| {
                Error::MalformedContainer(format!(
                    "header length {header_len} exceeds file size {}",
                    mmap.len()
                ))
            })?;

        let header: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&mmap[8..data_start]).map_err(|e| {
                Error::MalformedContainer(format!("header is not valid JSON: {e}"))
            })?;

        let data_len = mmap.len() - data_start;
        let mut tensors = HashMap::with_capacity(header.len());
        for (name, value) in header {
            if name == "__metadata__" {
                continue;
            }
            let entry: RawEntry = serde_json::from_value(value).map_err(|e| {
                Error::MalformedContainer(format!("entry `{name}` is not a tensor record: {e}"))
            })?;
            let [begin, end] = entry.data_offsets;
            if begin > end || end > data_len {
                return Err(Error::MalformedContainer(format!(
                    "tensor `{name}` data_offsets [{begin}, {end}] exceed the {data_len}-byte data section"
                )));
            }
            tensors.insert(
                name,
                SafeTensorInfo {
                    dtype: entry.dtype,
                    shape: entry.shape,
                    offset: begin,
                    len: end - begin,
                },
            );
        }

        Ok(Self {
            mmap,
            data_start,
            tensors,
        })
    }

    /// Names of all tensors in the container.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tensors.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Header descriptor for `name`.
    ///
    /// # Errors
    /// `TensorNotFound` if the container has no such tensor.
    pub fn info(&self, name: &str) -> Result<&SafeTensorInfo> {
        self.tensors
            .get(name)
            .ok_or_else(|| Error::TensorNotFound(name.to_string()))
    }

    /// The raw data section (everything after the header).
    #[must_use]
    pub fn data_section(&self) -> &[u8] {
        &self.mmap[self.data_start..]
    }

    /// A zero-copy view of tensor `name`, lifetime-bound to the
    /// reader.
    ///
    /// # Errors
    /// `TensorNotFound` for unknown names; `UnsupportedDtype` when
    /// the header dtype string is not one of F32/F16/BF16/I8;
    /// `MalformedContainer` when the declared byte length does not
    /// match `numel * size_in_bytes(dtype)`.
    pub fn tensor(&self, name: &str) -> Result<TensorView<'_>> {
        let info = self.info(name)?;
        let dtype = DType::from_safetensors(&info.dtype)
            .ok_or_else(|| Error::UnsupportedDtype(info.dtype.clone()))?;
        let numel: usize = info.shape.iter().product();
        if info.len != numel * dtype.size_in_bytes() {
            return Err(Error::MalformedContainer(format!(
                "tensor `{name}`: {} bytes declared, shape {:?} {dtype} needs {}",
                info.len,
                info.shape,
                numel * dtype.size_in_bytes()
            )));
        }
        let bytes = &self.data_section()[info.offset..info.offset + info.len];
        TensorView::new(bytes, dtype, &info.shape)
    }
}
