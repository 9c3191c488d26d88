//! Minimal NumPy `.npy` (format version 1.0) support for little-endian `f64` matrices.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

const MAGIC: &[u8] = b"\x93NUMPY";
const HEADER_ALIGNMENT: usize = 64;

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("File I/O error for '{path}': {source}")]
    Io { path: String, source: io::Error },
    #[error("'{path}' is not a NumPy v1.0 '<f8' C-ordered array: {reason}")]
    Format { path: String, reason: String },
    #[error("Row {row} has {actual} columns, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

fn header(rows: usize, columns: usize) -> Vec<u8> {
    let mut dict =
        format!("{{'descr': '<f8', 'fortran_order': False, 'shape': ({rows}, {columns}), }}");
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (HEADER_ALIGNMENT - unpadded % HEADER_ALIGNMENT) % HEADER_ALIGNMENT;
    dict.push_str(&" ".repeat(padding));
    dict.push('\n');

    let mut bytes = Vec::with_capacity(MAGIC.len() + 4 + dict.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    bytes.extend_from_slice(dict.as_bytes());
    bytes
}

/// Writes `rows` as a `(rows.len(), columns)` array of `<f8`.
pub fn write_matrix<R: AsRef<[f64]>>(
    path: &Path,
    rows: &[R],
    columns: usize,
) -> Result<(), NpyError> {
    for (row, values) in rows.iter().enumerate() {
        if values.as_ref().len() != columns {
            return Err(NpyError::RaggedRows {
                row,
                expected: columns,
                actual: values.as_ref().len(),
            });
        }
    }
    let io_err = |e: io::Error| NpyError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    writer.write_all(&header(rows.len(), columns)).map_err(io_err)?;
    for values in rows {
        for value in values.as_ref() {
            writer.write_all(&value.to_le_bytes()).map_err(io_err)?;
        }
    }
    writer.flush().map_err(io_err)
}

/// Reads a 2-D `<f8` array written by [`write_matrix`] (or NumPy), returning its rows.
pub fn read_matrix(path: &Path) -> Result<Vec<Vec<f64>>, NpyError> {
    let io_err = |e: io::Error| NpyError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    };
    let format_err = |reason: &str| NpyError::Format {
        path: path.to_string_lossy().to_string(),
        reason: reason.to_string(),
    };

    let mut reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut preamble = [0u8; 10];
    reader.read_exact(&mut preamble).map_err(io_err)?;
    if &preamble[..6] != MAGIC || preamble[6] != 1 {
        return Err(format_err("bad magic or version"));
    }
    let header_len = u16::from_le_bytes([preamble[8], preamble[9]]) as usize;
    let mut dict = vec![0u8; header_len];
    reader.read_exact(&mut dict).map_err(io_err)?;
    let dict = String::from_utf8(dict).map_err(|_| format_err("header is not UTF-8"))?;
    if !dict.contains("'descr': '<f8'") || !dict.contains("'fortran_order': False") {
        return Err(format_err("unsupported dtype or order"));
    }

    let shape = dict
        .split("'shape': (")
        .nth(1)
        .and_then(|rest| rest.split(')').next())
        .ok_or_else(|| format_err("missing shape"))?;
    let dims = shape
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::parse::<usize>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format_err("invalid shape"))?;
    let &[rows, columns] = dims.as_slice() else {
        return Err(format_err("expected a two-dimensional array"));
    };

    let mut data = Vec::with_capacity(rows);
    let mut buffer = [0u8; 8];
    for _ in 0..rows {
        let mut row = Vec::with_capacity(columns);
        for _ in 0..columns {
            reader.read_exact(&mut buffer).map_err(io_err)?;
            row.push(f64::from_le_bytes(buffer));
        }
        data.push(row);
    }
    Ok(data)
}
