use crate::core::models::cell::{CellError, UnitCell};
use crate::core::models::element::Element;
use crate::core::models::frame::FrameData;
use nalgebra::Point3;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: io::Error,
    },
    #[error("I/O error while reading trajectory: {0}")]
    Read(#[from] io::Error),
    #[error("Unexpected end of file in frame {frame}")]
    UnexpectedEof { frame: usize },
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Frame {frame} declares {actual} atoms, expected {expected}")]
    AtomCount {
        frame: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Frame {frame} atom {atom} is '{actual}', expected '{expected}'")]
    SpeciesMismatch {
        frame: usize,
        atom: usize,
        expected: Element,
        actual: Element,
    },
    #[error("Comment line {line} carries no Lattice=\"...\" entry")]
    MissingLattice { line: usize },
    #[error("Invalid cell on line {line}: {source}")]
    Cell { line: usize, source: CellError },
    #[error("Requested frame {requested}, but the trajectory holds only {total} frames")]
    ReadPastEnd { requested: usize, total: usize },
}

/// Run-constant properties read from the first record of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryHeader {
    pub species: Vec<Element>,
    pub cell: UnitCell,
}

impl TrajectoryHeader {
    pub fn atoms_per_frame(&self) -> usize {
        self.species.len()
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TrajectoryError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| TrajectoryError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
}

/// Reads species and cell from the first record. An empty file has no header.
pub fn read_header(path: &Path) -> Result<Option<TrajectoryHeader>, TrajectoryError> {
    let mut records = RecordReader::new(open(path)?);
    let atom_count = match records.next_line()? {
        Some(line) if !line.trim().is_empty() => parse_atom_count(&line, records.line)?,
        _ => {
            debug!("Trajectory is empty.");
            return Ok(None);
        }
    };
    let comment = records.require_line(0)?;
    let cell = parse_lattice(&comment, records.line)?;
    let mut species = Vec::with_capacity(atom_count);
    for _ in 0..atom_count {
        let line = records.require_line(0)?;
        let (element, _) = parse_atom_line(&line, records.line)?;
        species.push(element);
    }
    debug!(atoms = atom_count, volume = cell.volume(), "Read trajectory header.");
    Ok(Some(TrajectoryHeader { species, cell }))
}

/// Frame count of a fixed-record trajectory, `round(lines / (atoms_per_frame + 2))`.
pub fn count_frames(path: &Path, atoms_per_frame: usize) -> Result<usize, TrajectoryError> {
    let mut reader = open(path)?;
    let mut buffer = Vec::new();
    let mut lines = 0usize;
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }
        lines += 1;
    }
    let record_lines = (atoms_per_frame + 2) as f64;
    Ok((lines as f64 / record_lines).round() as usize)
}

/// Sequential, single-owner reader that yields one frame per call.
///
/// Every record is validated against the run-constant species list. The reader refuses to
/// go past `total_frames`.
pub struct FrameSource<R> {
    records: RecordReader<R>,
    species: Vec<Element>,
    total_frames: usize,
    frames_read: usize,
}

impl FrameSource<BufReader<File>> {
    pub fn open(
        path: &Path,
        species: Vec<Element>,
        total_frames: usize,
    ) -> Result<Self, TrajectoryError> {
        Ok(Self::from_reader(open(path)?, species, total_frames))
    }
}

impl<R: BufRead> FrameSource<R> {
    pub fn from_reader(reader: R, species: Vec<Element>, total_frames: usize) -> Self {
        Self {
            records: RecordReader::new(reader),
            species,
            total_frames,
            frames_read: 0,
        }
    }

    pub fn next_frame(&mut self) -> Result<FrameData, TrajectoryError> {
        let frame = self.frames_read;
        if frame >= self.total_frames {
            return Err(TrajectoryError::ReadPastEnd {
                requested: frame,
                total: self.total_frames,
            });
        }

        let count_line = self.records.require_line(frame)?;
        let declared = parse_atom_count(&count_line, self.records.line)?;
        if declared != self.species.len() {
            return Err(TrajectoryError::AtomCount {
                frame,
                expected: self.species.len(),
                actual: declared,
            });
        }
        self.records.require_line(frame)?;

        let mut positions = Vec::with_capacity(declared);
        for (atom, expected) in self.species.iter().enumerate() {
            let line = self.records.require_line(frame)?;
            let (element, position) = parse_atom_line(&line, self.records.line)?;
            if element != *expected {
                return Err(TrajectoryError::SpeciesMismatch {
                    frame,
                    atom,
                    expected: *expected,
                    actual: element,
                });
            }
            positions.push(position);
        }

        self.frames_read += 1;
        Ok(FrameData::new(frame, positions))
    }

    /// Reads the next `count` frames in order.
    pub fn read_batch(&mut self, count: usize) -> Result<Vec<FrameData>, TrajectoryError> {
        (0..count).map(|_| self.next_frame()).collect()
    }
}

struct RecordReader<R> {
    reader: R,
    buffer: String,
    line: usize,
}

impl<R: BufRead> RecordReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: String::new(),
            line: 0,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>, TrajectoryError> {
        self.buffer.clear();
        if self.reader.read_line(&mut self.buffer)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(self.buffer.trim_end().to_string()))
    }

    fn require_line(&mut self, frame: usize) -> Result<String, TrajectoryError> {
        self.next_line()?
            .ok_or(TrajectoryError::UnexpectedEof { frame })
    }
}

fn parse_atom_count(line: &str, line_number: usize) -> Result<usize, TrajectoryError> {
    line.trim().parse().map_err(|_| TrajectoryError::Parse {
        line: line_number,
        message: format!("expected an atom count, found '{}'", line.trim()),
    })
}

fn parse_atom_line(line: &str, line_number: usize) -> Result<(Element, Point3<f64>), TrajectoryError> {
    let mut fields = line.split_whitespace();
    let symbol = fields.next().ok_or_else(|| TrajectoryError::Parse {
        line: line_number,
        message: "empty atom line".to_string(),
    })?;
    let element: Element = symbol.parse().map_err(|e| TrajectoryError::Parse {
        line: line_number,
        message: format!("{e}"),
    })?;
    let mut coords = [0.0; 3];
    for coord in coords.iter_mut() {
        let field = fields.next().ok_or_else(|| TrajectoryError::Parse {
            line: line_number,
            message: "atom line has fewer than three coordinates".to_string(),
        })?;
        *coord = field.parse().map_err(|_| TrajectoryError::Parse {
            line: line_number,
            message: format!("invalid coordinate '{field}'"),
        })?;
    }
    Ok((element, Point3::from(coords)))
}

fn parse_lattice(comment: &str, line_number: usize) -> Result<UnitCell, TrajectoryError> {
    const KEY: &str = "Lattice=\"";
    let start = comment
        .find(KEY)
        .map(|i| i + KEY.len())
        .ok_or(TrajectoryError::MissingLattice { line: line_number })?;
    let end = comment[start..]
        .find('"')
        .map(|i| start + i)
        .ok_or(TrajectoryError::MissingLattice { line: line_number })?;

    let values = comment[start..end]
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrajectoryError::Parse {
            line: line_number,
            message: format!("invalid lattice value: {e}"),
        })?;
    let flat: [f64; 9] = values.try_into().map_err(|v: Vec<f64>| TrajectoryError::Parse {
        line: line_number,
        message: format!("lattice needs 9 values, found {}", v.len()),
    })?;
    UnitCell::from_flat(flat).map_err(|source| TrajectoryError::Cell {
        line: line_number,
        source,
    })
}
