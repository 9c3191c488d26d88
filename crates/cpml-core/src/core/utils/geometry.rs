use crate::core::models::cell::UnitCell;
use crate::core::models::topology::Topology;
use nalgebra::{Point3, Vector3};
use tracing::warn;

/// Bond length above which a molecule is considered broken across the cell boundary.
pub const MAX_BOND_LENGTH: f64 = 3.0;

/// Molecule-local coordinates of one molecule after periodic unwrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeGeometry {
    pub atoms: Vec<Point3<f64>>,
    pub bond_centers: Vec<Point3<f64>>,
}

/// Unwraps every molecule of a frame and computes its bond centres.
///
/// `atoms` holds only molecular atoms (markers removed), ordered molecule by molecule.
pub fn unwrap_molecules(
    atoms: &[Point3<f64>],
    topology: &Topology,
    cell: &UnitCell,
) -> Vec<MoleculeGeometry> {
    atoms
        .chunks_exact(topology.atoms_per_molecule())
        .enumerate()
        .map(|(molecule, positions)| unwrap_molecule(molecule, positions, topology, cell))
        .collect()
}

fn unwrap_molecule(
    molecule: usize,
    positions: &[Point3<f64>],
    topology: &Topology,
    cell: &UnitCell,
) -> MoleculeGeometry {
    let anchor = positions[topology.representative_atom()];

    let mut offsets: Vec<Vector3<f64>> = positions
        .iter()
        .map(|position| cell.minimum_image(&(*position - anchor)))
        .collect();

    if longest_bond(&offsets, topology) > MAX_BOND_LENGTH {
        offsets = rebuild_along_bonds(positions, topology, cell);
        let longest = longest_bond(&offsets, topology);
        if longest > MAX_BOND_LENGTH {
            warn!(
                molecule,
                longest_bond = longest,
                "Molecule still has an over-long bond after unwrapping."
            );
        }
    }

    let bond_centers = topology
        .bonds()
        .iter()
        .map(|bond| anchor + (offsets[bond.first] + offsets[bond.second]) * 0.5)
        .collect();
    let atoms = offsets.iter().map(|offset| anchor + *offset).collect();

    MoleculeGeometry {
        atoms,
        bond_centers,
    }
}

fn longest_bond(offsets: &[Vector3<f64>], topology: &Topology) -> f64 {
    topology
        .bonds()
        .iter()
        .map(|bond| (offsets[bond.first] - offsets[bond.second]).norm())
        .fold(0.0, f64::max)
}

fn rebuild_along_bonds(
    positions: &[Point3<f64>],
    topology: &Topology,
    cell: &UnitCell,
) -> Vec<Vector3<f64>> {
    let mut offsets = vec![Vector3::zeros(); positions.len()];
    for (atom, parent) in topology.traversal_order() {
        let step = cell.minimum_image(&(positions[atom] - positions[parent]));
        offsets[atom] = offsets[parent] + step;
    }
    offsets
}
