use crate::core::models::topology::{BondClass, Topology};
use crate::core::utils::geometry::MoleculeGeometry;
use nalgebra::{Point3, Vector3};

/// Upper bound on the ring bond centres averaged into one ring centre.
pub const MAX_RING_BONDS: usize = 8;

/// Descriptor sites of one class, molecule by molecule, in partition order.
pub fn class_sites(
    class: BondClass,
    molecules: &[MoleculeGeometry],
    topology: &Topology,
) -> Vec<Point3<f64>> {
    match class {
        BondClass::Ring => ring_centers(molecules, topology),
        BondClass::OxygenLonePair => atom_sites(molecules, &topology.partitions().oxygen_sites),
        bond_class => bond_sites(molecules, topology.bond_indices(bond_class)),
    }
}

fn bond_sites(molecules: &[MoleculeGeometry], bond_indices: &[usize]) -> Vec<Point3<f64>> {
    molecules
        .iter()
        .flat_map(|molecule| bond_indices.iter().map(|&b| molecule.bond_centers[b]))
        .collect()
}

fn atom_sites(molecules: &[MoleculeGeometry], atom_indices: &[usize]) -> Vec<Point3<f64>> {
    molecules
        .iter()
        .flat_map(|molecule| atom_indices.iter().map(|&a| molecule.atoms[a]))
        .collect()
}

/// One centre per molecule: the mean of its first [`MAX_RING_BONDS`] ring bond centres.
/// A topology without ring bonds yields no centres.
pub fn ring_centers(molecules: &[MoleculeGeometry], topology: &Topology) -> Vec<Point3<f64>> {
    let ring = &topology.partitions().ring;
    if ring.is_empty() {
        return Vec::new();
    }
    let used = &ring[..ring.len().min(MAX_RING_BONDS)];
    molecules
        .iter()
        .map(|molecule| {
            let sum = used
                .iter()
                .fold(Vector3::zeros(), |acc, &b| acc + molecule.bond_centers[b].coords);
            Point3::from(sum / used.len() as f64)
        })
        .collect()
}
