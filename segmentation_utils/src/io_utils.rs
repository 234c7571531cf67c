//! Helpers for turning file names into sample names.

use anyhow::{bail, Result};
use std::ffi::OsStr;
use std::path::Path;

/// Return the part of each file name that precedes the first `delimiter`.
///
/// Directories are stripped first, so `data/fov1.cell_table.csv` with a `.`
/// delimiter becomes `fov1`. Names without the delimiter are returned whole
/// when `delimiter_optional` is set, and are an error otherwise.
pub fn extract_delimited_names<P: AsRef<Path>>(
    names: &[P],
    delimiter: char,
    delimiter_optional: bool,
) -> Result<Vec<String>> {
    let basenames: Vec<String> = names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            name.file_name()
                .map_or_else(|| name.to_string_lossy(), OsStr::to_string_lossy)
                .into_owned()
        })
        .collect();

    if !delimiter_optional {
        let missing: Vec<_> = basenames
            .iter()
            .filter(|name| !name.contains(delimiter))
            .collect();
        if !missing.is_empty() {
            bail!("The following files do not contain the delimiter {delimiter:?}: {missing:?}");
        }
    }

    Ok(basenames
        .into_iter()
        .map(|name| match name.split_once(delimiter) {
            Some((prefix, _)) => prefix.to_string(),
            None => name,
        })
        .collect())
}
