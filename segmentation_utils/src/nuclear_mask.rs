//! Match a segmented cell to the nucleus it overlaps most.

use crate::errors::SegmentationUtilsError;
use anyhow::Result;
use itertools::Itertools;
use log::debug;
use ndarray::{ArrayBase, Data, Dimension, NdIndex};
use num_traits::Zero;
use std::cmp::Reverse;
use std::fmt::Debug;
use std::hash::Hash;

/// Get the ID of the nuclear mask which has the greatest overlap with a cell.
///
/// `cell_coords` lists every pixel belonging to the cell, one index per pixel
/// in the nuclear mask's dimensionality. Background (0) never wins. Returns
/// `None` if no pixel of the cell lands on a nucleus.
///
/// When several nuclei overlap the cell by the same number of pixels the
/// smallest nucleus ID is returned.
pub fn find_nuclear_mask_id<S, D, I>(
    nuclear_mask: &ArrayBase<S, D>,
    cell_coords: &[I],
) -> Result<Option<S::Elem>>
where
    S: Data,
    S::Elem: Copy + Eq + Hash + Ord + Zero + Debug,
    D: Dimension,
    I: NdIndex<D> + Copy + Debug,
{
    let labels = cell_coords
        .iter()
        .map(|&coord| {
            nuclear_mask.get(coord).copied().ok_or_else(|| {
                SegmentationUtilsError::CoordinateOutOfBounds {
                    coordinate: format!("{coord:?}"),
                    shape: nuclear_mask.shape().to_vec(),
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let overlaps = labels
        .into_iter()
        .filter(|label| !label.is_zero())
        .counts();

    let nuclear_mask_id = overlaps
        .into_iter()
        .max_by_key(|&(label, count)| (count, Reverse(label)))
        .map(|(label, _)| label);

    debug!(
        "{} cell pixels, dominant nucleus {nuclear_mask_id:?}",
        cell_coords.len()
    );
    Ok(nuclear_mask_id)
}

/// Coordinates of every pixel carrying `label`, in row-major order.
pub fn label_coordinates<S, D>(mask: &ArrayBase<S, D>, label: S::Elem) -> Vec<D::Pattern>
where
    S: Data,
    S::Elem: PartialEq,
    D: Dimension,
{
    mask.indexed_iter()
        .filter(|(_, value)| **value == label)
        .map(|(index, _)| index)
        .collect()
}
