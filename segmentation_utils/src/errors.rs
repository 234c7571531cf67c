//! Validation failures raised before any data is touched.
//!
//! These are returned wrapped in [`anyhow::Error`]; use `downcast_ref` to
//! match on a specific variant.

use thiserror::Error;

/// Typed validation errors for the segmentation utilities.
#[derive(Debug, Error, PartialEq)]
pub enum SegmentationUtilsError {
    /// Transform name is not one of the supported transforms.
    #[error("Invalid transform supplied: {0:?}. Must be one of {valid:?}", valid = crate::expression_matrix::Transform::NAMES)]
    UnsupportedTransform(String),

    /// The feature axis has no marker boundary name.
    #[error("Feature axis has no {0:?} entry marking the end of the marker channels")]
    MissingMarkerBoundary(&'static str),

    /// The feature axis names the marker boundary more than once.
    #[error("Feature axis contains {name:?} {count} times, expected exactly once")]
    DuplicateMarkerBoundary {
        /// boundary name
        name: &'static str,
        /// number of occurrences
        count: usize,
    },

    /// Linear factor for arcsinh must be positive and finite.
    #[error("linear_factor must be a positive number, got {0}")]
    InvalidLinearFactor(f64),

    /// Feature names do not match the feature axis.
    #[error("Expected {expected} feature names for the feature axis, got {actual}")]
    FeatureCountMismatch {
        /// length of the feature axis
        expected: usize,
        /// number of names supplied
        actual: usize,
    },

    /// Identifier list does not line up with the CSV list.
    #[error("csv_files and column_values have different lengths: csv {csv_files}, column_values {column_values}")]
    IdentifierLengthMismatch {
        /// number of CSV files
        csv_files: usize,
        /// number of identifiers
        column_values: usize,
    },

    /// Nothing to concatenate.
    #[error("No CSV files supplied for concatenation")]
    NoInputTables,

    /// A table header names the same column twice.
    #[error("Column {0:?} appears more than once in the table header")]
    DuplicateColumn(String),

    /// A table row does not have one field per header column.
    #[error("Row {row} has {actual} fields but the header has {expected} columns")]
    RaggedRow {
        /// zero-based data row index
        row: usize,
        /// number of header columns
        expected: usize,
        /// number of fields in the row
        actual: usize,
    },

    /// A cell coordinate falls outside the mask.
    #[error("Coordinate {coordinate} is outside of the mask whose shape is {shape:?}")]
    CoordinateOutOfBounds {
        /// offending coordinate, debug formatted
        coordinate: String,
        /// mask shape
        shape: Vec<usize>,
    },
}
