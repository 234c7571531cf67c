//! segmentation_utils
//!
//! Post-segmentation helpers for multiplexed imaging: matching cells to
//! nuclei, normalizing per-cell marker expression, and combining per-sample
//! cell tables.
#![deny(missing_docs)]

pub mod concatenate;
pub mod errors;
pub mod expression_matrix;
pub mod io_utils;
pub mod nuclear_mask;

pub use concatenate::{concatenate_csv, CsvTable, COMBINED_CSV_NAME, DEFAULT_ID_COLUMN};
pub use errors::SegmentationUtilsError;
pub use expression_matrix::{
    transform_expression_matrix, LabeledArray, Transform, TransformOptions, MARKER_BOUNDARY,
};
pub use io_utils::extract_delimited_names;
pub use nuclear_mask::{find_nuclear_mask_id, label_coordinates};
