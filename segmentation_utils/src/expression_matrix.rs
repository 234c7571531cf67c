//! Normalization of per-cell marker expression.
//!
//! Expression data is a [`LabeledArray`] with axes (sample, cell, feature).
//! Feature 0 holds the cell size, marker channels follow, and the feature
//! named [`MARKER_BOUNDARY`] starts the non-marker columns. Transforms only
//! ever touch the marker channels.
#![allow(missing_docs)]

use crate::errors::SegmentationUtilsError;
use anyhow::{ensure, Context, Result};
use log::{debug, info, warn};
use ndarray::{s, Array3, Axis, Zip};
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

/// Name of the first feature that is not a marker channel.
pub const MARKER_BOUNDARY: &str = "label";

/// Feature index holding the size of each cell.
pub const SIZE_CHANNEL: usize = 0;

const FIRST_MARKER_CHANNEL: usize = SIZE_CHANNEL + 1;

/// Scaling applied before arcsinh when none is configured.
pub const DEFAULT_LINEAR_FACTOR: f64 = 100.0;

/// A (sample, cell, feature) array with named features.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledArray {
    values: Array3<f64>,
    features: Vec<String>,
}

impl LabeledArray {
    /// Pair values with one name per entry of the feature axis.
    pub fn new<T: Into<String>>(
        values: Array3<f64>,
        features: impl IntoIterator<Item = T>,
    ) -> Result<Self> {
        let features: Vec<String> = features.into_iter().map(Into::into).collect();
        let expected = values.len_of(Axis(2));
        ensure!(
            features.len() == expected,
            SegmentationUtilsError::FeatureCountMismatch {
                expected,
                actual: features.len(),
            }
        );
        Ok(LabeledArray { values, features })
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Position of the first feature called `name`.
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|feature| feature == name)
    }

    /// Range of feature indices holding marker channels: everything after the
    /// size channel and before [`MARKER_BOUNDARY`].
    pub fn marker_channels(&self) -> Result<Range<usize>> {
        let count = self
            .features
            .iter()
            .filter(|feature| *feature == MARKER_BOUNDARY)
            .count();
        ensure!(
            count <= 1,
            SegmentationUtilsError::DuplicateMarkerBoundary {
                name: MARKER_BOUNDARY,
                count,
            }
        );
        let channel_end = self
            .feature_index(MARKER_BOUNDARY)
            .ok_or(SegmentationUtilsError::MissingMarkerBoundary(MARKER_BOUNDARY))?;
        Ok(FIRST_MARKER_CHANNEL..channel_end.max(FIRST_MARKER_CHANNEL))
    }

    pub fn into_parts(self) -> (Array3<f64>, Vec<String>) {
        (self.values, self.features)
    }
}

/// Supported expression transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Divide marker counts by cell size.
    SizeNorm,
    /// Scale by a linear factor, then take the inverse hyperbolic sine.
    Arcsinh,
}

impl Transform {
    /// Names accepted by [`Transform::from_str`].
    pub const NAMES: [&'static str; 2] = ["size_norm", "arcsinh"];

    pub fn name(self) -> &'static str {
        match self {
            Transform::SizeNorm => Self::NAMES[0],
            Transform::Arcsinh => Self::NAMES[1],
        }
    }

    /// Apply this transform to the marker channels of `cell_data`.
    ///
    /// All validation happens before the values are copied, so a failed call
    /// never leaves a partially transformed array behind. The input is not
    /// modified.
    pub fn apply(
        self,
        cell_data: &LabeledArray,
        options: &TransformOptions,
    ) -> Result<LabeledArray> {
        let channels = cell_data.marker_channels()?;
        let linear_factor = match self {
            Transform::SizeNorm => 1.0,
            Transform::Arcsinh => options.linear_factor()?,
        };
        info!(
            "Applying {self} to marker channels {}..{} of {} features",
            channels.start,
            channels.end,
            cell_data.features.len()
        );

        let mut transformed = cell_data.values.clone();
        let mut markers = transformed.slice_mut(s![.., .., channels]);

        match self {
            Transform::SizeNorm => {
                let cell_size = cell_data.values.index_axis(Axis(2), SIZE_CHANNEL);
                let mut skipped = 0usize;
                // Cells without a positive size keep their raw counts
                Zip::from(markers.lanes_mut(Axis(2)))
                    .and(&cell_size)
                    .for_each(|mut cell, &size| {
                        if size > 0.0 {
                            cell /= size;
                        } else {
                            skipped += 1;
                        }
                    });
                if skipped > 0 {
                    debug!("{skipped} cells with non-positive size left unnormalized");
                }
            }
            Transform::Arcsinh => {
                markers *= linear_factor;
                markers.mapv_inplace(f64::asinh);
            }
        }

        Ok(LabeledArray {
            values: transformed,
            features: cell_data.features.clone(),
        })
    }
}

impl Display for Transform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Transform {
    type Err = SegmentationUtilsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "size_norm" => Ok(Transform::SizeNorm),
            "arcsinh" => Ok(Transform::Arcsinh),
            _ => Err(SegmentationUtilsError::UnsupportedTransform(s.to_string())),
        }
    }
}

/// Optional settings for a transform.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformOptions {
    /// Multiplier applied before arcsinh. Defaults to [`DEFAULT_LINEAR_FACTOR`].
    pub linear_factor: Option<f64>,
}

impl TransformOptions {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Invalid transform options")
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
        Self::from_toml_str(&s).with_context(|| path.display().to_string())
    }

    /// The configured linear factor, which must be positive and finite.
    pub fn linear_factor(&self) -> Result<f64> {
        let linear_factor = self.linear_factor.unwrap_or(DEFAULT_LINEAR_FACTOR);
        ensure!(
            linear_factor.is_finite() && linear_factor > 0.0,
            SegmentationUtilsError::InvalidLinearFactor(linear_factor)
        );
        if linear_factor != DEFAULT_LINEAR_FACTOR {
            warn!("using non-default linear_factor = {linear_factor}");
        }
        Ok(linear_factor)
    }
}

/// Transform an array of marker counts with the named transform.
///
/// `transform` must be one of [`Transform::NAMES`]. Channel 0 (cell size) and
/// every feature from [`MARKER_BOUNDARY`] onwards are returned unchanged.
pub fn transform_expression_matrix(
    cell_data: &LabeledArray,
    transform: &str,
    options: Option<&TransformOptions>,
) -> Result<LabeledArray> {
    let transform: Transform = transform.parse()?;
    let options = options.cloned().unwrap_or_default();
    transform.apply(cell_data, &options)
}
