//! # Descriptor Module
//!
//! Local-environment descriptors for bond centres and lone-pair sites.
//!
//! For a site, neighbours of each species in [`NEIGHBOR_SPECIES`] are ranked by a smooth
//! cutoff weight `s(r)` and encoded as `[s, s*x/r, s*y/r, s*z/r]`. Each species block is
//! truncated or zero-padded to a fixed neighbour count, so every site of every class maps
//! to a vector of [`DescriptorParams::width`] features.

pub mod sites;

use crate::core::models::cell::UnitCell;
use crate::core::models::element::Element;
use crate::core::models::topology::{BondClass, Topology};
use crate::core::utils::geometry::MoleculeGeometry;
use nalgebra::{DMatrix, Point3, Vector3};
use std::collections::BTreeMap;
use std::f64::consts::PI;

pub const NEIGHBOR_SPECIES: [Element; 3] = [Element::C, Element::H, Element::O];

/// Squared distances at or below this value are treated as the site itself.
const SELF_DISTANCE_SQUARED: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorParams {
    pub inner_cutoff: f64,
    pub outer_cutoff: f64,
    pub max_neighbors: usize,
}

impl Default for DescriptorParams {
    fn default() -> Self {
        Self {
            inner_cutoff: 4.0,
            outer_cutoff: 6.0,
            max_neighbors: 24,
        }
    }
}

impl DescriptorParams {
    pub fn width(&self) -> usize {
        NEIGHBOR_SPECIES.len() * self.max_neighbors * 4
    }

    pub fn cutoff_weight(&self, distance: f64) -> f64 {
        if distance < self.inner_cutoff {
            1.0 / distance
        } else if distance < self.outer_cutoff {
            let phase = PI * (distance - self.inner_cutoff) / (self.outer_cutoff - self.inner_cutoff);
            (1.0 / distance) * (0.5 * phase.cos() + 0.5)
        } else {
            0.0
        }
    }
}

/// Descriptor matrices of one frame, one row per site, keyed by class. Classes without
/// sites map to a matrix with zero rows.
pub type DescriptorSet = BTreeMap<BondClass, DMatrix<f64>>;

/// Molecular atoms of one frame grouped by neighbour species.
pub struct NeighborEnvironment<'a> {
    cell: &'a UnitCell,
    groups: Vec<Vec<Point3<f64>>>,
}

impl<'a> NeighborEnvironment<'a> {
    pub fn new(cell: &'a UnitCell, elements: &[Element], positions: &[Point3<f64>]) -> Self {
        let groups = NEIGHBOR_SPECIES
            .iter()
            .map(|species| {
                elements
                    .iter()
                    .zip(positions)
                    .filter(|(element, _)| *element == species)
                    .map(|(_, position)| *position)
                    .collect()
            })
            .collect();
        Self { cell, groups }
    }

    /// Writes the descriptor of `center` into `row`, which must be `params.width()` long.
    pub fn describe_into(&self, center: &Point3<f64>, params: &DescriptorParams, row: &mut [f64]) {
        let block = params.max_neighbors * 4;
        for (group, chunk) in self.groups.iter().zip(row.chunks_exact_mut(block)) {
            chunk.fill(0.0);
            let mut neighbors: Vec<(f64, Vector3<f64>)> = group
                .iter()
                .map(|atom| self.cell.minimum_image(&(*atom - *center)))
                .filter(|d| d.norm_squared() > SELF_DISTANCE_SQUARED)
                .map(|d| {
                    let r = d.norm();
                    (params.cutoff_weight(r), d / r)
                })
                .collect();
            neighbors.sort_by(|a, b| b.0.total_cmp(&a.0));

            for ((weight, unit), slot) in neighbors.iter().zip(chunk.chunks_exact_mut(4)) {
                slot[0] = *weight;
                slot[1] = weight * unit.x;
                slot[2] = weight * unit.y;
                slot[3] = weight * unit.z;
            }
        }
    }

    pub fn describe_sites(&self, centers: &[Point3<f64>], params: &DescriptorParams) -> DMatrix<f64> {
        let width = params.width();
        let mut flat = vec![0.0; centers.len() * width];
        for (center, row) in centers.iter().zip(flat.chunks_exact_mut(width)) {
            self.describe_into(center, params, row);
        }
        DMatrix::from_row_slice(centers.len(), width, &flat)
    }
}

/// Computes the descriptor matrix of every class for one frame.
pub fn describe_frame(
    environment: &NeighborEnvironment,
    molecules: &[MoleculeGeometry],
    topology: &Topology,
    params: &DescriptorParams,
) -> DescriptorSet {
    BondClass::ALL
        .into_iter()
        .map(|class| {
            let centers = sites::class_sites(class, molecules, topology);
            (class, environment.describe_sites(&centers, params))
        })
        .collect()
}
