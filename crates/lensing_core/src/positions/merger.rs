//! Collapses clusters of accepted cells into one solution per image.

use std::collections::HashMap;

use crate::coordinate::Coordinate;
use crate::error::LensResult;
use crate::grid::CellIndex;
use crate::positions::locator::AcceptedCell;
use crate::positions::magnification::MagnificationEvaluator;
use crate::traits::LensSystem;

/// Union-find over solution indices.
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// The smallest-residual member of every set, sorted by `(y, x)`.
    fn representatives(mut self, members: &[AcceptedCell]) -> Vec<AcceptedCell> {
        let mut best: HashMap<usize, AcceptedCell> = HashMap::new();
        for (i, member) in members.iter().enumerate() {
            let root = self.find(i);
            best.entry(root)
                .and_modify(|current| {
                    if member.cmp_by_residual(current).is_lt() {
                        *current = *member;
                    }
                })
                .or_insert(*member);
        }
        let mut representatives: Vec<AcceptedCell> = best.into_values().collect();
        representatives.sort_by(|a, b| a.coordinate.cmp_yx(&b.coordinate));
        representatives
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolutionMerger {
    merge_radius_pixels: f64,
}

impl SolutionMerger {
    pub fn new(merge_radius_pixels: f64) -> Self {
        Self {
            merge_radius_pixels,
        }
    }

    /// Groups cells whose centres lie one finest pixel apart (cells sharing an
    /// edge) and keeps the smallest-residual cell of each group. Diagonal
    /// neighbours are left to [`Self::discard_stragglers`].
    pub fn merge(&self, accepted: &[AcceptedCell]) -> Vec<AcceptedCell> {
        let index: HashMap<CellIndex, usize> = accepted
            .iter()
            .enumerate()
            .map(|(i, cell)| (cell.cell, i))
            .collect();
        let mut sets = DisjointSet::new(accepted.len());
        for (i, cell) in accepted.iter().enumerate() {
            let CellIndex { row, col } = cell.cell;
            // Each pair is seen from both ends, so looking down and right is enough.
            for neighbour in [CellIndex::new(row + 1, col), CellIndex::new(row, col + 1)] {
                if let Some(&j) = index.get(&neighbour) {
                    sets.union(i, j);
                }
            }
        }
        sets.representatives(accepted)
    }

    /// Merges representatives whose Newton-projected roots land within
    /// `merge_radius_pixels` finest pixels of each other. Near high
    /// magnification one image can leave detached patches of accepted cells;
    /// their linearised roots still coincide.
    pub fn discard_stragglers<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        representatives: &[AcceptedCell],
        target: Coordinate,
        plane_index: usize,
        evaluator: &MagnificationEvaluator,
        finest_pixel_scale: f64,
    ) -> LensResult<Vec<AcceptedCell>> {
        if representatives.len() < 2 {
            return Ok(representatives.to_vec());
        }
        let mut roots = Vec::with_capacity(representatives.len());
        for representative in representatives {
            roots.push(linearised_root(
                lens,
                representative.coordinate,
                target,
                plane_index,
                evaluator,
            )?);
        }

        let radius = self.merge_radius_pixels * finest_pixel_scale;
        let mut sets = DisjointSet::new(representatives.len());
        for i in 0..roots.len() {
            for j in (i + 1)..roots.len() {
                if roots[i].distance(&roots[j]) <= radius {
                    sets.union(i, j);
                }
            }
        }
        let survivors = sets.representatives(representatives);
        if survivors.len() < representatives.len() {
            log::debug!(
                "merged {} straggling representatives",
                representatives.len() - survivors.len()
            );
        }
        Ok(survivors)
    }
}

/// One Newton step `θ - A⁻¹ r` from `coordinate`; a singular `A` leaves it in place.
fn linearised_root<L: LensSystem + ?Sized>(
    lens: &L,
    coordinate: Coordinate,
    target: Coordinate,
    plane_index: usize,
    evaluator: &MagnificationEvaluator,
) -> LensResult<Coordinate> {
    Ok(evaluator
        .newton_step(lens, coordinate, target, plane_index)?
        .map_or(coordinate, |step| coordinate - step))
}
