use crate::core::descriptor::DescriptorSet;
use crate::core::models::topology::BondClass;
use nalgebra::DMatrix;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorWriteError {
    #[error("CSV error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("Invalid value '{value}' in '{path}'")]
    Value { path: String, value: String },
}

pub fn descriptor_file_name(class: BondClass, frame_index: usize) -> String {
    format!("Descs_{}_{}.csv", class.label(), frame_index)
}

/// Writes one headerless CSV row per site.
pub fn write_descriptor_matrix(path: &Path, matrix: &DMatrix<f64>) -> Result<(), DescriptorWriteError> {
    let csv_err = |e: csv::Error| DescriptorWriteError::Csv {
        path: path.to_string_lossy().to_string(),
        source: e,
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    for row in matrix.row_iter() {
        writer
            .write_record(row.iter().map(|value| format!("{value:.18e}")))
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|e| csv_err(e.into()))
}

/// Writes every non-empty class of a frame into `directory`, returning the files written.
pub fn write_frame_descriptors(
    directory: &Path,
    frame_index: usize,
    descriptors: &DescriptorSet,
) -> Result<Vec<PathBuf>, DescriptorWriteError> {
    let mut written = Vec::new();
    for (class, matrix) in descriptors {
        if matrix.nrows() == 0 {
            continue;
        }
        let path = directory.join(descriptor_file_name(*class, frame_index));
        write_descriptor_matrix(&path, matrix)?;
        written.push(path);
    }
    Ok(written)
}

/// Reads a descriptor CSV back into rows.
pub fn read_descriptor_rows(path: &Path) -> Result<Vec<Vec<f64>>, DescriptorWriteError> {
    let csv_err = |e: csv::Error| DescriptorWriteError::Csv {
        path: path.to_string_lossy().to_string(),
        source: e,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let row = record
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|_| DescriptorWriteError::Value {
                    path: path.to_string_lossy().to_string(),
                    value: field.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn writes_only_non_empty_classes() {
        let dir = tempdir().unwrap();
        let mut set: DescriptorSet = BTreeMap::new();
        set.insert(
            BondClass::CarbonHydrogen,
            DMatrix::from_row_slice(2, 3, &[1.0, 0.5, -0.25, 0.0, 2.0, 1e-12]),
        );
        set.insert(BondClass::Ring, DMatrix::zeros(0, 3));

        let written = write_frame_descriptors(dir.path(), 7, &set).unwrap();

        assert_eq!(written, vec![dir.path().join("Descs_ch_7.csv")]);
        assert!(!dir.path().join("Descs_ring_7.csv").exists());
        let rows = read_descriptor_rows(&written[0]).unwrap();
        assert_eq!(rows, vec![vec![1.0, 0.5, -0.25], vec![0.0, 2.0, 1e-12]]);
    }
}
