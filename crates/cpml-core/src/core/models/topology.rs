use super::element::Element;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Unknown GAFF atom type '{atom_type}' for atom {atom}")]
    UnknownAtomType { atom: usize, atom_type: String },
    #[error("Topology defines no atoms")]
    NoAtoms,
    #[error("Bond {bond} references atom {atom}, but the molecule has {atom_count} atoms")]
    AtomOutOfRange {
        bond: usize,
        atom: usize,
        atom_count: usize,
    },
    #[error("Bond {bond} connects atom {atom} to itself")]
    SelfBond { bond: usize, atom: usize },
    #[error("Double bond ({0}, {1}) is not listed among the bonds")]
    UnknownDoubleBond(usize, usize),
    #[error("Trajectory has {atoms} molecular atoms, not a multiple of {per_molecule} atoms per molecule")]
    IncompatibleAtomCount { atoms: usize, per_molecule: usize },
    #[error("Molecule {molecule}, atom {atom}: topology expects {expected}, trajectory has {actual}")]
    SpeciesMismatch {
        molecule: usize,
        atom: usize,
        expected: Element,
        actual: Element,
    },
}

/// Bond or site category that owns its own descriptor stream and regressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BondClass {
    CarbonHydrogen,
    OxygenHydrogen,
    CarbonOxygen,
    CarbonCarbon,
    Ring,
    OxygenLonePair,
}

impl BondClass {
    pub const ALL: [BondClass; 6] = [
        BondClass::CarbonHydrogen,
        BondClass::OxygenHydrogen,
        BondClass::CarbonOxygen,
        BondClass::CarbonCarbon,
        BondClass::Ring,
        BondClass::OxygenLonePair,
    ];

    /// Short name used in file names (`Descs_ch_0.csv`, `model_ch.json`).
    pub fn label(self) -> &'static str {
        match self {
            BondClass::CarbonHydrogen => "ch",
            BondClass::OxygenHydrogen => "oh",
            BondClass::CarbonOxygen => "co",
            BondClass::CarbonCarbon => "cc",
            BondClass::Ring => "ring",
            BondClass::OxygenLonePair => "o",
        }
    }
}

impl fmt::Display for BondClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub first: usize,
    pub second: usize,
}

impl Bond {
    pub fn new(first: usize, second: usize) -> Self {
        Self { first, second }
    }

    pub fn connects(&self, a: usize, b: usize) -> bool {
        (self.first == a && self.second == b) || (self.first == b && self.second == a)
    }
}

/// Index partitions derived from atom types. Bond partitions hold indices into
/// `Topology::bonds`; site partitions hold atom indices within a molecule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondPartitions {
    pub carbon_hydrogen: Vec<usize>,
    pub oxygen_hydrogen: Vec<usize>,
    pub carbon_oxygen: Vec<usize>,
    pub carbon_carbon: Vec<usize>,
    pub ring: Vec<usize>,
    pub oxygen_sites: Vec<usize>,
    pub nitrogen_sites: Vec<usize>,
}

const AROMATIC_CARBON: &str = "ca";

/// Molecular topology shared by every molecule of the system.
///
/// Molecules are consecutive blocks of `atoms_per_molecule()` atoms in every frame, in
/// topology order.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    elements: Vec<Element>,
    bonds: Vec<Bond>,
    double_bonds: Vec<usize>,
    partitions: BondPartitions,
    representative_atom: usize,
}

impl Topology {
    pub fn new(
        atom_types: Vec<String>,
        elements: Vec<Element>,
        bonds: Vec<Bond>,
        double_bond_pairs: &[(usize, usize)],
    ) -> Result<Self, TopologyError> {
        if elements.is_empty() {
            return Err(TopologyError::NoAtoms);
        }
        let atom_count = elements.len();
        for (index, bond) in bonds.iter().enumerate() {
            for atom in [bond.first, bond.second] {
                if atom >= atom_count {
                    return Err(TopologyError::AtomOutOfRange {
                        bond: index,
                        atom,
                        atom_count,
                    });
                }
            }
            if bond.first == bond.second {
                return Err(TopologyError::SelfBond {
                    bond: index,
                    atom: bond.first,
                });
            }
        }

        let double_bonds = double_bond_pairs
            .iter()
            .map(|&(a, b)| {
                bonds
                    .iter()
                    .position(|bond| bond.connects(a, b))
                    .ok_or(TopologyError::UnknownDoubleBond(a, b))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let partitions = partition_bonds(&atom_types, &elements, &bonds);

        Ok(Self {
            elements,
            bonds,
            double_bonds,
            partitions,
            representative_atom: 0,
        })
    }

    pub fn atoms_per_molecule(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn double_bonds(&self) -> &[usize] {
        &self.double_bonds
    }

    pub fn partitions(&self) -> &BondPartitions {
        &self.partitions
    }

    pub fn representative_atom(&self) -> usize {
        self.representative_atom
    }

    /// Bond indices of a bond class. The lone-pair class has no bonds.
    pub fn bond_indices(&self, class: BondClass) -> &[usize] {
        match class {
            BondClass::CarbonHydrogen => &self.partitions.carbon_hydrogen,
            BondClass::OxygenHydrogen => &self.partitions.oxygen_hydrogen,
            BondClass::CarbonOxygen => &self.partitions.carbon_oxygen,
            BondClass::CarbonCarbon => &self.partitions.carbon_carbon,
            BondClass::Ring => &self.partitions.ring,
            BondClass::OxygenLonePair => &[],
        }
    }

    /// Whether a class yields at least one descriptor site per molecule.
    pub fn has_sites(&self, class: BondClass) -> bool {
        match class {
            BondClass::OxygenLonePair => !self.partitions.oxygen_sites.is_empty(),
            other => !self.bond_indices(other).is_empty(),
        }
    }

    /// Checks that a frame's molecular species are whole copies of this molecule and
    /// returns the number of molecules.
    pub fn validate_species(&self, elements: &[Element]) -> Result<usize, TopologyError> {
        let per_molecule = self.atoms_per_molecule();
        if elements.len() % per_molecule != 0 {
            return Err(TopologyError::IncompatibleAtomCount {
                atoms: elements.len(),
                per_molecule,
            });
        }
        for (molecule, chunk) in elements.chunks_exact(per_molecule).enumerate() {
            if let Some((atom, (&actual, &expected))) = chunk
                .iter()
                .zip(&self.elements)
                .enumerate()
                .find(|(_, (actual, expected))| actual != expected)
            {
                return Err(TopologyError::SpeciesMismatch {
                    molecule,
                    atom,
                    expected,
                    actual,
                });
            }
        }
        Ok(elements.len() / per_molecule)
    }

    pub fn neighbors(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.atoms_per_molecule()];
        for bond in &self.bonds {
            adjacency[bond.first].push(bond.second);
            adjacency[bond.second].push(bond.first);
        }
        adjacency
    }

    /// Breadth-first visiting order from the representative atom, paired with the parent
    /// each atom is reached from. Atoms unreachable through bonds are appended with the
    /// representative atom as parent.
    pub fn traversal_order(&self) -> Vec<(usize, usize)> {
        let adjacency = self.neighbors();
        let root = self.representative_atom;
        let mut visited = vec![false; self.atoms_per_molecule()];
        let mut order = Vec::with_capacity(self.atoms_per_molecule());
        let mut queue = VecDeque::from([root]);
        visited[root] = true;
        while let Some(atom) = queue.pop_front() {
            for &next in &adjacency[atom] {
                if !visited[next] {
                    visited[next] = true;
                    order.push((next, atom));
                    queue.push_back(next);
                }
            }
        }
        for (atom, seen) in visited.iter().enumerate() {
            if !seen {
                order.push((atom, root));
            }
        }
        order
    }
}

fn partition_bonds(atom_types: &[String], elements: &[Element], bonds: &[Bond]) -> BondPartitions {
    let mut partitions = BondPartitions::default();
    for (index, bond) in bonds.iter().enumerate() {
        let pair = (elements[bond.first], elements[bond.second]);
        match pair {
            (Element::C, Element::H) | (Element::H, Element::C) => {
                partitions.carbon_hydrogen.push(index)
            }
            (Element::O, Element::H) | (Element::H, Element::O) => {
                partitions.oxygen_hydrogen.push(index)
            }
            (Element::C, Element::O) | (Element::O, Element::C) => {
                partitions.carbon_oxygen.push(index)
            }
            (Element::C, Element::C) => {
                let aromatic = atom_types[bond.first] == AROMATIC_CARBON
                    && atom_types[bond.second] == AROMATIC_CARBON;
                if aromatic {
                    partitions.ring.push(index)
                } else {
                    partitions.carbon_carbon.push(index)
                }
            }
            _ => {}
        }
    }
    for (atom, element) in elements.iter().enumerate() {
        match element {
            Element::O => partitions.oxygen_sites.push(atom),
            Element::N => partitions.nitrogen_sites.push(atom),
            _ => {}
        }
    }
    partitions
}
