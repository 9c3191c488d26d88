use crate::core::models::element::Element;
use crate::core::models::topology::{Bond, Topology, TopologyError};
use phf::{Map, phf_map};
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info};

/// GAFF atom types and the element each one denotes.
static GAFF_ELEMENTS: Map<&'static str, Element> = phf_map! {
    "hc" => Element::H, "ha" => Element::H, "hn" => Element::H, "ho" => Element::H,
    "hs" => Element::H, "hp" => Element::H, "h1" => Element::H, "h2" => Element::H,
    "h3" => Element::H, "h4" => Element::H, "h5" => Element::H,
    "o" => Element::O, "oh" => Element::O, "os" => Element::O,
    "c" => Element::C, "c1" => Element::C, "c2" => Element::C, "c3" => Element::C,
    "c6" => Element::C, "ca" => Element::C, "cc" => Element::C, "cd" => Element::C,
    "ce" => Element::C, "cf" => Element::C, "cp" => Element::C, "cq" => Element::C,
    "cu" => Element::C, "cv" => Element::C, "cx" => Element::C, "cy" => Element::C,
    "n" => Element::N, "n1" => Element::N, "n2" => Element::N, "n3" => Element::N,
    "n4" => Element::N, "na" => Element::N, "nh" => Element::N, "no" => Element::N,
    "nb" => Element::N, "nc" => Element::N, "nd" => Element::N,
    "s2" => Element::S, "sh" => Element::S, "ss" => Element::S, "s4" => Element::S,
    "s6" => Element::S, "sx" => Element::S, "sy" => Element::S,
    "pb" => Element::P, "pc" => Element::P, "pd" => Element::P, "pe" => Element::P,
    "pf" => Element::P, "px" => Element::P, "py" => Element::P,
};

pub fn gaff_element(atom_type: &str) -> Option<Element> {
    GAFF_ELEMENTS.get(atom_type).copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Atoms,
    Bonds,
    DoubleBonds,
    Other,
}

/// Reads a GROMACS `.itp` topology.
///
/// Only `[ atoms ]` (GAFF type in the second column), `[ bonds ]` (1-based atom pairs)
/// and the optional `[ double_bonds ]` section are interpreted; every other section is
/// skipped. Comments start with `;`, preprocessor lines with `#`.
pub fn read_topology(path: &Path) -> Result<Topology, TopologyError> {
    let file = std::fs::File::open(path).map_err(|e| TopologyError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    let topology = parse_topology(std::io::BufReader::new(file))?;
    info!(
        atoms = topology.atoms_per_molecule(),
        bonds = topology.bonds().len(),
        "Loaded molecular topology."
    );
    Ok(topology)
}

pub fn parse_topology(reader: impl BufRead) -> Result<Topology, TopologyError> {
    let mut section = Section::Other;
    let mut atom_types = Vec::new();
    let mut elements = Vec::new();
    let mut bonds = Vec::new();
    let mut double_bonds = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|e| TopologyError::Parse {
            line: line_number,
            message: e.to_string(),
        })?;
        let content = line.split(';').next().unwrap_or("").trim();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }
        if let Some(name) = content.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            section = match name.trim() {
                "atoms" => Section::Atoms,
                "bonds" => Section::Bonds,
                "double_bonds" => Section::DoubleBonds,
                _ => Section::Other,
            };
            continue;
        }

        let fields: Vec<&str> = content.split_whitespace().collect();
        match section {
            Section::Atoms => {
                let atom_type = fields.get(1).ok_or_else(|| TopologyError::Parse {
                    line: line_number,
                    message: "atom row needs at least an index and a type".to_string(),
                })?;
                let element =
                    gaff_element(atom_type).ok_or_else(|| TopologyError::UnknownAtomType {
                        atom: atom_types.len() + 1,
                        atom_type: atom_type.to_string(),
                    })?;
                atom_types.push(atom_type.to_string());
                elements.push(element);
            }
            Section::Bonds => {
                let (a, b) = parse_pair(&fields, line_number)?;
                bonds.push(Bond::new(a, b));
            }
            Section::DoubleBonds => double_bonds.push(parse_pair(&fields, line_number)?),
            Section::Other => {}
        }
    }

    debug!(
        atom_types = ?atom_types,
        double_bonds = double_bonds.len(),
        "Parsed topology sections."
    );
    Topology::new(atom_types, elements, bonds, &double_bonds)
}

/// Parses a 1-based atom pair into 0-based indices.
fn parse_pair(fields: &[&str], line: usize) -> Result<(usize, usize), TopologyError> {
    let index = |position: usize| -> Result<usize, TopologyError> {
        let field = fields.get(position).ok_or_else(|| TopologyError::Parse {
            line,
            message: "bond row needs two atom indices".to_string(),
        })?;
        let value: usize = field.parse().map_err(|_| TopologyError::Parse {
            line,
            message: format!("invalid atom index '{field}'"),
        })?;
        value.checked_sub(1).ok_or_else(|| TopologyError::Parse {
            line,
            message: "atom indices are 1-based".to_string(),
        })
    };
    Ok((index(0)?, index(1)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::topology::BondClass;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;

    const METHANOL_ITP: &str = "\
[ moleculetype ]
; name  nrexcl
 MOL    3

[ atoms ]
;   nr  type  resi  res  atom  cgnr     charge      mass
     1   c3     1   MOL    C1    1     0.116700     12.01000
     2   h1     1   MOL    H1    2     0.028700      1.00800
     3   h1     1   MOL    H2    3     0.028700      1.00800
     4   h1     1   MOL    H3    4     0.028700      1.00800
     5   oh     1   MOL    O1    5    -0.598800     16.00000
     6   ho     1   MOL    H4    6     0.396000      1.00800

[ bonds ]
;   ai     aj funct   r             k
     1      2   1    1.0970e-01    3.1455e+05
     1      3   1    1.0970e-01    3.1455e+05
     1      4   1    1.0970e-01    3.1455e+05
     1      5   1    1.4233e-01    2.4811e+05
     5      6   1    9.7300e-02    3.1062e+05

[ pairs ]
     2      6      1
";

    #[test]
    fn parses_methanol_topology() {
        let topology = parse_topology(Cursor::new(METHANOL_ITP)).unwrap();

        assert_eq!(topology.atoms_per_molecule(), 6);
        assert_eq!(topology.elements()[4], Element::O);
        assert_eq!(topology.bonds().len(), 5);
        assert_eq!(topology.bonds()[4], Bond::new(4, 5));
        assert_eq!(topology.bond_indices(BondClass::CarbonHydrogen), &[0, 1, 2]);
        assert_eq!(topology.bond_indices(BondClass::CarbonOxygen), &[3]);
        assert_eq!(topology.bond_indices(BondClass::OxygenHydrogen), &[4]);
        assert_eq!(topology.partitions().oxygen_sites, vec![4]);
        assert!(topology.double_bonds().is_empty());
    }

    #[test]
    fn reads_optional_double_bond_section() {
        let text = "\
[ atoms ]
1 c2 1 MOL C1 1 0.0 12.0
2 o  1 MOL O1 2 0.0 16.0
[ bonds ]
1 2 1
[ double_bonds ]
2 1
";
        let topology = parse_topology(Cursor::new(text)).unwrap();
        assert_eq!(topology.double_bonds(), &[0]);
    }

    #[test]
    fn unknown_atom_type_is_an_error() {
        let text = "[ atoms ]\n1 zz 1 MOL Q1 1 0.0 1.0\n";
        let err = parse_topology(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, TopologyError::UnknownAtomType { atom: 1, .. }));
    }

    #[test]
    fn zero_or_garbage_bond_index_is_a_parse_error() {
        let text = "[ atoms ]\n1 c3\n2 hc\n[ bonds ]\n0 1 1\n";
        assert!(matches!(
            parse_topology(Cursor::new(text)),
            Err(TopologyError::Parse { line: 5, .. })
        ));
        let text = "[ atoms ]\n1 c3\n2 hc\n[ bonds ]\n1 x 1\n";
        assert!(matches!(
            parse_topology(Cursor::new(text)),
            Err(TopologyError::Parse { line: 5, .. })
        ));
    }

    #[test]
    fn read_topology_reports_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.itp");
        assert!(matches!(read_topology(&missing), Err(TopologyError::Io { .. })));

        let path = dir.path().join("mol.itp");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{METHANOL_ITP}").unwrap();
        drop(file);
        assert_eq!(read_topology(&path).unwrap().atoms_per_molecule(), 6);
    }
}
