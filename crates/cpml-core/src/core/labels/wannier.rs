use crate::core::models::cell::UnitCell;
use crate::core::models::topology::Topology;
use crate::core::utils::geometry::MoleculeGeometry;
use crate::core::utils::units::CHARGE_ANGSTROM_TO_DEBYE;
use nalgebra::{Point3, Vector3};
use thiserror::Error;
use tracing::warn;

/// Radius around a double-bond centre searched for its pi marker.
pub const PI_MARKER_RADIUS: f64 = 0.65;

/// Marker distances above this are suspicious and logged.
const FAR_MARKER_DISTANCE: f64 = 1.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("Molecule {molecule} needs {needed} more marker(s) but only {available} remain unassigned")]
    InsufficientMarkers {
        molecule: usize,
        needed: usize,
        available: usize,
    },
}

/// Nearest-marker assignment for electron-pair sites.
///
/// Lone pairs and bond centres always take their nearest markers, even when another site
/// already claimed one. Pi markers only come from markers nothing else claimed.
struct MarkerPool<'a> {
    markers: &'a [Point3<f64>],
    claimed: Vec<bool>,
    cell: &'a UnitCell,
}

impl<'a> MarkerPool<'a> {
    fn new(markers: &'a [Point3<f64>], cell: &'a UnitCell) -> Self {
        Self {
            markers,
            claimed: vec![false; markers.len()],
            cell,
        }
    }

    fn displacement(&self, index: usize, site: &Point3<f64>) -> Vector3<f64> {
        self.cell.minimum_image(&(self.markers[index] - *site))
    }

    /// Displacements from `site` to its `count` nearest markers.
    fn nearest(
        &mut self,
        molecule: usize,
        site: &Point3<f64>,
        count: usize,
    ) -> Result<Vec<Vector3<f64>>, LabelError> {
        if self.markers.len() < count {
            return Err(LabelError::InsufficientMarkers {
                molecule,
                needed: count,
                available: self.markers.len(),
            });
        }
        let mut candidates: Vec<(usize, Vector3<f64>)> = (0..self.markers.len())
            .map(|index| (index, self.displacement(index, site)))
            .collect();
        candidates.sort_by(|a, b| a.1.norm_squared().total_cmp(&b.1.norm_squared()));
        candidates.truncate(count);

        for (index, displacement) in &candidates {
            if self.claimed[*index] {
                warn!(
                    molecule,
                    marker = *index,
                    "Marker is already assigned to another site; reusing it."
                );
            }
            self.claimed[*index] = true;
            if displacement.norm() > FAR_MARKER_DISTANCE {
                warn!(
                    molecule,
                    marker = *index,
                    distance = displacement.norm(),
                    "Assigned marker lies unusually far from its site."
                );
            }
        }
        Ok(candidates.into_iter().map(|(_, d)| d).collect())
    }

    /// The first unclaimed marker within `radius` of `site`, in marker order.
    fn claim_within(&mut self, site: &Point3<f64>, radius: f64) -> Option<Vector3<f64>> {
        let (index, displacement) = (0..self.markers.len())
            .filter(|index| !self.claimed[*index])
            .map(|index| (index, self.displacement(index, site)))
            .find(|(_, displacement)| displacement.norm() < radius)?;
        self.claimed[index] = true;
        Some(displacement)
    }
}

/// Assigns markers to lone pairs and bonds and returns the cell dipole in Debye.
///
/// Assignment runs over the whole frame in a fixed order: oxygen lone pairs (two markers
/// each), nitrogen lone pairs (one), bond centres (one each), then an optional pi marker
/// per double bond.
pub fn reference_dipole(
    markers: &[Point3<f64>],
    molecules: &[MoleculeGeometry],
    topology: &Topology,
    cell: &UnitCell,
) -> Result<Vector3<f64>, LabelError> {
    let coef = CHARGE_ANGSTROM_TO_DEBYE;
    let partitions = topology.partitions();
    let mut pool = MarkerPool::new(markers, cell);
    let mut dipole = Vector3::zeros();

    for (m, molecule) in molecules.iter().enumerate() {
        for &atom in &partitions.oxygen_sites {
            let pair = pool.nearest(m, &molecule.atoms[atom], 2)?;
            dipole += -4.0 * coef * (pair[0] + pair[1]) / 2.0;
        }
    }
    for (m, molecule) in molecules.iter().enumerate() {
        for &atom in &partitions.nitrogen_sites {
            let single = pool.nearest(m, &molecule.atoms[atom], 1)?;
            dipole += -2.0 * coef * single[0];
        }
    }
    for (m, molecule) in molecules.iter().enumerate() {
        for center in &molecule.bond_centers {
            let single = pool.nearest(m, center, 1)?;
            dipole += -2.0 * coef * single[0];
        }
    }
    for molecule in molecules {
        for &bond in topology.double_bonds() {
            if let Some(displacement) = pool.claim_within(&molecule.bond_centers[bond], PI_MARKER_RADIUS) {
                dipole += -2.0 * coef * displacement;
            }
        }
    }
    Ok(dipole)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::topology::Bond;

    fn hydroxyl() -> Topology {
        Topology::new(
            vec!["oh".into(), "ho".into()],
            vec![Element::O, Element::H],
            vec![Bond::new(0, 1)],
            &[],
        )
        .unwrap()
    }

    fn geometry(origin: Point3<f64>) -> MoleculeGeometry {
        MoleculeGeometry {
            atoms: vec![origin, origin + Vector3::new(1.0, 0.0, 0.0)],
            bond_centers: vec![origin + Vector3::new(0.5, 0.0, 0.0)],
        }
    }

    #[test]
    fn lone_pair_and_bond_markers_give_expected_dipole() {
        let cell = UnitCell::cubic(20.0).unwrap();
        let origin = Point3::new(5.0, 5.0, 5.0);
        let markers = [
            origin + Vector3::new(-0.3, 0.2, 0.0),
            origin + Vector3::new(-0.3, -0.2, 0.0),
            origin + Vector3::new(0.6, 0.0, 0.0),
        ];
        let result = reference_dipole(&markers, &[geometry(origin)], &hydroxyl(), &cell).unwrap();

        let coef = CHARGE_ANGSTROM_TO_DEBYE;
        let lone_pair = -4.0 * coef * Vector3::new(-0.3, 0.0, 0.0);
        let bond = -2.0 * coef * Vector3::new(0.1, 0.0, 0.0);
        assert!((result - (lone_pair + bond)).norm() < 1e-9);
    }

    #[test]
    fn markers_are_found_across_the_periodic_boundary() {
        let cell = UnitCell::cubic(10.0).unwrap();
        let origin = Point3::new(0.1, 5.0, 5.0);
        let markers = [
            Point3::new(9.9, 5.2, 5.0),
            Point3::new(9.9, 4.8, 5.0),
            Point3::new(0.6, 5.0, 5.0),
        ];
        let result = reference_dipole(&markers, &[geometry(origin)], &hydroxyl(), &cell).unwrap();
        let expected_lone_pair = -4.0 * CHARGE_ANGSTROM_TO_DEBYE * Vector3::new(-0.2, 0.0, 0.0);
        let expected_bond = Vector3::zeros();
        assert!((result - (expected_lone_pair + expected_bond)).norm() < 1e-9);
    }

    #[test]
    fn missing_markers_are_reported() {
        let cell = UnitCell::cubic(20.0).unwrap();
        let origin = Point3::new(5.0, 5.0, 5.0);
        let markers = [origin + Vector3::new(0.3, 0.0, 0.0)];
        let err = reference_dipole(&markers, &[geometry(origin)], &hydroxyl(), &cell).unwrap_err();
        assert_eq!(
            err,
            LabelError::InsufficientMarkers {
                molecule: 0,
                needed: 2,
                available: 1
            }
        );
    }

    #[test]
    fn bonds_sharing_a_nearest_marker_both_use_it() {
        let water = Topology::new(
            vec!["ow".into(), "hw".into(), "hw".into()],
            vec![Element::O, Element::H, Element::H],
            vec![Bond::new(0, 1), Bond::new(0, 2)],
            &[],
        )
        .unwrap();
        let cell = UnitCell::cubic(20.0).unwrap();
        let origin = Point3::new(5.0, 5.0, 5.0);
        let molecule = MoleculeGeometry {
            atoms: vec![
                origin,
                origin + Vector3::new(1.0, 0.0, 0.0),
                origin + Vector3::new(0.0, 1.0, 0.0),
            ],
            bond_centers: vec![
                origin + Vector3::new(0.5, 0.0, 0.0),
                origin + Vector3::new(0.0, 0.5, 0.0),
            ],
        };
        let markers = [
            origin + Vector3::new(-0.2, -0.2, 0.2),
            origin + Vector3::new(-0.2, -0.2, -0.2),
            origin + Vector3::new(0.3, 0.3, 0.0),
        ];

        let result = reference_dipole(&markers, &[molecule], &water, &cell).unwrap();

        let coef = CHARGE_ANGSTROM_TO_DEBYE;
        let lone_pair = -4.0 * coef * Vector3::new(-0.2, -0.2, 0.0);
        let first_bond = -2.0 * coef * Vector3::new(-0.2, 0.3, 0.0);
        let second_bond = -2.0 * coef * Vector3::new(0.3, -0.2, 0.0);
        assert!((result - (lone_pair + first_bond + second_bond)).norm() < 1e-9);
    }

    #[test]
    fn pi_marker_is_optional_and_never_shared() {
        let topology = Topology::new(
            vec!["c2".into(), "c2".into()],
            vec![Element::C, Element::C],
            vec![Bond::new(0, 1)],
            &[(0, 1)],
        )
        .unwrap();
        let cell = UnitCell::cubic(20.0).unwrap();
        let molecule = MoleculeGeometry {
            atoms: vec![Point3::new(5.0, 5.0, 5.0), Point3::new(6.3, 5.0, 5.0)],
            bond_centers: vec![Point3::new(5.65, 5.0, 5.0)],
        };

        let sigma_only = [Point3::new(5.65, 5.0, 5.0)];
        let result = reference_dipole(&sigma_only, &[molecule.clone()], &topology, &cell).unwrap();
        assert!(result.norm() < 1e-12);

        let with_pi = [Point3::new(5.65, 5.0, 5.0), Point3::new(5.65, 5.5, 5.0)];
        let result = reference_dipole(&with_pi, &[molecule], &topology, &cell).unwrap();
        let expected = -2.0 * CHARGE_ANGSTROM_TO_DEBYE * Vector3::new(0.0, 0.5, 0.0);
        assert!((result - expected).norm() < 1e-9);
    }
}
