//! Boundary to the inference backend that consumes a verified model.
//!
//! Only [`crate::gate`] calls a [`ModelLoader`], and only after the file's
//! digest matched.

use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prepared session handed back by a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSession {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Loader failure, independent of integrity status.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read model {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("model {} is empty", .path.display())]
    Empty { path: PathBuf },
    #[error("model {} is malformed: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
}

/// Loads a model file and prepares it for inference.
pub trait ModelLoader {
    fn load(&mut self, path: &Path) -> Result<ModelSession, LoadError>;
}

/// Default loader: checks that the file parses as a serialized ONNX model.
///
/// An ONNX file is a protobuf `ModelProto`. The top-level fields are walked to
/// end of file: every key must be valid, every varint must terminate, and
/// every sized field must fit inside the file. No graph is built and nothing
/// is executed.
#[derive(Debug, Default)]
pub struct OnnxProbeLoader;

impl ModelLoader for OnnxProbeLoader {
    fn load(&mut self, path: &Path) -> Result<ModelSession, LoadError> {
        let io_err = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = fs::File::open(path).map_err(io_err)?;
        let size_bytes = file.metadata().map_err(io_err)?.len();
        if size_bytes == 0 {
            return Err(LoadError::Empty {
                path: path.to_path_buf(),
            });
        }
        match walk_fields(BufReader::new(file), size_bytes) {
            Ok(fields) => {
                tracing::debug!(path = %path.display(), fields, "model fields parsed");
            }
            Err(FieldError::Io(source)) => return Err(io_err(source)),
            Err(FieldError::Malformed(reason)) => {
                return Err(LoadError::Malformed {
                    path: path.to_path_buf(),
                    reason,
                })
            }
        }
        Ok(ModelSession {
            path: path.to_path_buf(),
            size_bytes,
        })
    }
}

/// Largest protobuf field number.
const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;
/// A 64-bit varint never needs more than ten bytes.
const MAX_VARINT_BYTES: u32 = 10;

#[derive(Debug)]
enum FieldError {
    Io(io::Error),
    Malformed(String),
}

impl From<io::Error> for FieldError {
    fn from(err: io::Error) -> Self {
        FieldError::Io(err)
    }
}

/// Walk the top-level protobuf fields of `size` bytes read from `reader`.
///
/// Returns the number of fields seen.
fn walk_fields(mut reader: impl Read, size: u64) -> Result<u64, FieldError> {
    let mut offset = 0u64;
    let mut fields = 0u64;
    while offset < size {
        let key_offset = offset;
        let key = read_varint(&mut reader, &mut offset, size)?;
        let wire_type = key & 0x07;
        let field = key >> 3;
        if field == 0 || field > MAX_FIELD_NUMBER {
            return Err(FieldError::Malformed(format!(
                "invalid protobuf field number {field} at offset {key_offset}"
            )));
        }
        let payload = match wire_type {
            0 => {
                read_varint(&mut reader, &mut offset, size)?;
                0
            }
            1 => 8,
            2 => read_varint(&mut reader, &mut offset, size)?,
            5 => 4,
            other => {
                return Err(FieldError::Malformed(format!(
                    "unsupported protobuf wire type {other} at offset {key_offset}"
                )))
            }
        };
        if payload > size - offset {
            return Err(FieldError::Malformed(format!(
                "field {field} at offset {key_offset} runs past end of file"
            )));
        }
        let skipped = io::copy(&mut reader.by_ref().take(payload), &mut io::sink())?;
        if skipped != payload {
            return Err(FieldError::Io(io::Error::from(io::ErrorKind::UnexpectedEof)));
        }
        offset += payload;
        fields += 1;
    }
    Ok(fields)
}

fn read_varint(reader: &mut impl Read, offset: &mut u64, size: u64) -> Result<u64, FieldError> {
    let start = *offset;
    let mut value = 0u64;
    for i in 0..MAX_VARINT_BYTES {
        if *offset >= size {
            return Err(FieldError::Malformed(format!(
                "truncated varint at offset {start}"
            )));
        }
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        *offset += 1;
        value |= u64::from(byte[0] & 0x7f) << (7 * i);
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(FieldError::Malformed(format!(
        "varint at offset {start} is too long"
    )))
}
