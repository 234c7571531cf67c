//! Combine per-sample CSV tables into a single table.
#![allow(missing_docs)]

use crate::errors::SegmentationUtilsError;
use crate::io_utils::extract_delimited_names;
use anyhow::{bail, ensure, Context, Result};
use itertools::Itertools;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// File written into the base directory by [`concatenate_csv`].
pub const COMBINED_CSV_NAME: &str = "combined_data.csv";

/// Column holding the sample identifier unless another is requested.
pub const DEFAULT_ID_COLUMN: &str = "point";

/// A CSV table held as text, header first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Build a table from unique column names and rows holding exactly one
    /// field per column.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some(column) = headers.iter().duplicates().next() {
            bail!(SegmentationUtilsError::DuplicateColumn(column.clone()));
        }
        if let Some((row, fields)) = rows
            .iter()
            .enumerate()
            .find(|(_, fields)| fields.len() != headers.len())
        {
            bail!(SegmentationUtilsError::RaggedRow {
                row,
                expected: headers.len(),
                actual: fields.len(),
            });
        }
        Ok(CsvTable { headers, rows })
    }

    /// Read a comma separated file with a header row.
    ///
    /// A repeated column name gets a numeric suffix (`cell`, `cell.1`, ...).
    /// Rows shorter than the header are padded with empty fields; rows longer
    /// than the header are an error.
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| path.display().to_string())?;

        let headers = dedup_column_names(
            reader
                .headers()
                .with_context(|| path.display().to_string())?
                .iter(),
        );

        let rows = reader
            .records()
            .map(|record| {
                record.map(|record| {
                    let mut fields = record.iter().map(str::to_string).collect_vec();
                    if fields.len() < headers.len() {
                        fields.resize(headers.len(), String::new());
                    }
                    fields
                })
            })
            .collect::<Result<Vec<Vec<String>>, _>>()
            .with_context(|| path.display().to_string())?;

        debug!("Read {} rows from {}", rows.len(), path.display());
        Self::new(headers, rows).with_context(|| path.display().to_string())
    }

    /// Write the header and rows, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer =
            csv::Writer::from_path(path).with_context(|| path.display().to_string())?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush().with_context(|| path.display().to_string())?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of a column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.headers.iter().position(|header| header == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row[index].as_str())
                .collect(),
        )
    }

    /// Set every row of column `name` to `value`, appending the column if the
    /// table does not have it yet.
    pub fn set_column(&mut self, name: &str, value: &str) {
        match self.headers.iter().position(|header| header == name) {
            Some(index) => {
                for row in &mut self.rows {
                    row[index] = value.to_string();
                }
            }
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    row.push(value.to_string());
                }
            }
        }
    }

    /// Stack tables vertically. Columns are the union of all headers in order
    /// of first appearance; a row from a table lacking a column gets an empty
    /// field there.
    pub fn concat(tables: impl IntoIterator<Item = CsvTable>) -> CsvTable {
        let tables = tables.into_iter().collect_vec();

        let mut headers: Vec<String> = Vec::new();
        let mut column_index: HashMap<String, usize> = HashMap::new();
        for header in tables.iter().flat_map(|table| &table.headers) {
            column_index.entry(header.clone()).or_insert_with(|| {
                headers.push(header.clone());
                headers.len() - 1
            });
        }

        let mut rows = Vec::with_capacity(tables.iter().map(CsvTable::len).sum());
        for table in tables {
            let positions = table
                .headers
                .iter()
                .map(|header| column_index[header])
                .collect_vec();
            for row in table.rows {
                let mut combined_row = vec![String::new(); headers.len()];
                for (&position, value) in positions.iter().zip(row) {
                    combined_row[position] = value;
                }
                rows.push(combined_row);
            }
        }
        CsvTable { headers, rows }
    }
}

/// Suffix repeated column names with `.1`, `.2`, ... so every name is unique.
fn dedup_column_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut headers = Vec::new();
    for name in names {
        let mut header = name.to_string();
        let mut suffix = 1;
        while seen.contains(&header) {
            header = format!("{name}.{suffix}");
            suffix += 1;
        }
        seen.insert(header.clone());
        headers.push(header);
    }
    headers
}

/// Concatenate CSV files from `base_dir`, tagging each row with the sample it
/// came from, and write the result to `base_dir/combined_data.csv`.
///
/// Each file's rows get `column_name` set to the matching entry of
/// `column_values`. Without `column_values` the file name up to its first
/// `.` is used. Files are read in the given order and their rows keep that
/// order in the output.
///
/// The identifier count is checked before any file is opened. Concurrent calls
/// on the same `base_dir` write the same output file and must be serialized by
/// the caller.
pub fn concatenate_csv<P: AsRef<Path>>(
    base_dir: &Path,
    csv_files: &[P],
    column_name: &str,
    column_values: Option<Vec<String>>,
) -> Result<()> {
    let column_values = match column_values {
        Some(column_values) => column_values,
        None => extract_delimited_names(csv_files, '.', true)?,
    };
    ensure!(
        column_values.len() == csv_files.len(),
        SegmentationUtilsError::IdentifierLengthMismatch {
            csv_files: csv_files.len(),
            column_values: column_values.len(),
        }
    );
    ensure!(!csv_files.is_empty(), SegmentationUtilsError::NoInputTables);

    let mut tables = Vec::with_capacity(csv_files.len());
    for (file, column_value) in csv_files.iter().zip(&column_values) {
        let mut table = CsvTable::read(&base_dir.join(file))?;
        table.set_column(column_name, column_value);
        tables.push(table);
    }
    let combined_data = CsvTable::concat(tables);

    let combined_path = base_dir.join(COMBINED_CSV_NAME);
    combined_data.write(&combined_path)?;
    info!(
        "Wrote {} rows from {} files to {}",
        combined_data.len(),
        csv_files.len(),
        combined_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{read_to_string, write};
    use tempfile::tempdir;

    const TABLE_A: &str = "cell,CD3\n1,0.5\n2,1.5\n";
    const TABLE_B: &str = "cell,CD8,CD3\n1,3,0.1\n2,4,0.2\n3,5,0.3\n";

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|&value| value.to_string()).collect()
    }

    fn sample_ids(ids: &[&str]) -> Option<Vec<String>> {
        Some(ids.iter().map(|&id| id.to_string()).collect())
    }

    #[test]
    fn test_concatenate_with_identifiers() -> Result<()> {
        let dir = tempdir()?;
        write(dir.path().join("a.csv"), TABLE_A)?;
        write(dir.path().join("b.csv"), TABLE_B)?;

        concatenate_csv(
            dir.path(),
            &["a.csv", "b.csv"],
            DEFAULT_ID_COLUMN,
            sample_ids(&["s1", "s2"]),
        )?;

        let combined = CsvTable::read(&dir.path().join(COMBINED_CSV_NAME))?;
        assert_eq!(combined.len(), 5);
        assert_eq!(combined.headers(), ["cell", "CD3", "point", "CD8"]);
        assert_eq!(
            combined.column("point"),
            Some(vec!["s1", "s1", "s2", "s2", "s2"])
        );
        assert_eq!(
            combined.column("cell"),
            Some(vec!["1", "2", "1", "2", "3"])
        );
        assert_eq!(
            read_to_string(dir.path().join(COMBINED_CSV_NAME))?,
            "cell,CD3,point,CD8\n\
             1,0.5,s1,\n\
             2,1.5,s1,\n\
             1,0.1,s2,3\n\
             2,0.2,s2,4\n\
             3,0.3,s2,5\n"
        );
        Ok(())
    }

    #[test]
    fn test_identifiers_from_file_names() -> Result<()> {
        let dir = tempdir()?;
        write(dir.path().join("fov1.csv"), TABLE_A)?;
        write(dir.path().join("fov2.cell_table.csv"), TABLE_A)?;

        concatenate_csv(
            dir.path(),
            &["fov1.csv", "fov2.cell_table.csv"],
            "fov",
            None,
        )?;

        let combined = CsvTable::read(&dir.path().join(COMBINED_CSV_NAME))?;
        assert_eq!(
            combined.column("fov"),
            Some(vec!["fov1", "fov1", "fov2", "fov2"])
        );
        Ok(())
    }

    #[test]
    fn test_existing_id_column_is_overwritten() -> Result<()> {
        let dir = tempdir()?;
        write(dir.path().join("a.csv"), "point,cell\nold,1\nold,2\n")?;
        write(dir.path().join(COMBINED_CSV_NAME), "stale\n")?;

        concatenate_csv(dir.path(), &["a.csv"], "point", sample_ids(&["7"]))?;

        assert_eq!(
            read_to_string(dir.path().join(COMBINED_CSV_NAME))?,
            "point,cell\n7,1\n7,2\n"
        );
        Ok(())
    }

    #[test]
    fn test_length_mismatch() -> Result<()> {
        let dir = tempdir()?;
        write(dir.path().join("a.csv"), TABLE_A)?;
        write(dir.path().join("b.csv"), TABLE_B)?;

        let err = concatenate_csv(
            dir.path(),
            &["a.csv", "b.csv"],
            DEFAULT_ID_COLUMN,
            sample_ids(&["s1", "s2", "s3"]),
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<SegmentationUtilsError>(),
            Some(&SegmentationUtilsError::IdentifierLengthMismatch {
                csv_files: 2,
                column_values: 3,
            })
        );
        assert!(err.to_string().contains("csv 2, column_values 3"));
        assert!(!dir.path().join(COMBINED_CSV_NAME).exists());
        Ok(())
    }

    #[test]
    fn test_no_files() -> Result<()> {
        let dir = tempdir()?;
        let no_files: [&str; 0] = [];
        let err = concatenate_csv(dir.path(), &no_files, DEFAULT_ID_COLUMN, None).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SegmentationUtilsError>(),
            Some(&SegmentationUtilsError::NoInputTables)
        );
        Ok(())
    }

    #[test]
    fn test_missing_file_writes_nothing() -> Result<()> {
        let dir = tempdir()?;
        write(dir.path().join("a.csv"), TABLE_A)?;

        let result = concatenate_csv(dir.path(), &["a.csv", "missing.csv"], "point", None);
        assert!(result.is_err());
        assert!(!dir.path().join(COMBINED_CSV_NAME).exists());
        Ok(())
    }

    #[test]
    fn test_repeated_column_names_get_suffixes() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("dup.csv");
        write(&path, "cell,cell,cell.1\n1,2,3\n")?;
        let table = CsvTable::read(&path)?;
        assert_eq!(table.headers(), ["cell", "cell.1", "cell.1.1"]);
        assert_eq!(table.rows(), [vec!["1", "2", "3"]]);
        Ok(())
    }

    #[test]
    fn test_short_rows_are_padded() -> Result<()> {
        let dir = tempdir()?;
        write(dir.path().join("short.csv"), "cell,CD3,CD8\n1,0.5\n2,1.5,3\n")?;
        concatenate_csv(dir.path(), &["short.csv"], "point", sample_ids(&["s1"]))?;
        assert_eq!(
            read_to_string(dir.path().join(COMBINED_CSV_NAME))?,
            "cell,CD3,CD8,point\n1,0.5,,s1\n2,1.5,3,s1\n"
        );
        Ok(())
    }

    #[test]
    fn test_long_rows_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("long.csv");
        write(&path, "cell\n1\n2,LOST\n")?;
        let err = CsvTable::read(&path).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SegmentationUtilsError>(),
            Some(&SegmentationUtilsError::RaggedRow {
                row: 1,
                expected: 1,
                actual: 2,
            })
        );
        Ok(())
    }

    #[test]
    fn test_new_validates_shape() {
        let err = CsvTable::new(strings(&["x", "y"]), vec![strings(&["1"])]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SegmentationUtilsError>(),
            Some(&SegmentationUtilsError::RaggedRow {
                row: 0,
                expected: 2,
                actual: 1,
            })
        );

        let err = CsvTable::new(strings(&["x"]), vec![strings(&["1", "LOST"])]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SegmentationUtilsError>(),
            Some(SegmentationUtilsError::RaggedRow { actual: 2, .. })
        ));

        let err = CsvTable::new(strings(&["x", "x"]), vec![]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SegmentationUtilsError>(),
            Some(&SegmentationUtilsError::DuplicateColumn("x".to_string()))
        );
    }

    #[test]
    fn test_set_column() -> Result<()> {
        let mut table = CsvTable::new(
            strings(&["x", "y"]),
            vec![strings(&["1", "2"]), strings(&["3", "4"])],
        )?;
        table.set_column("point", "s1");
        table.set_column("y", "0");
        assert_eq!(table.headers(), ["x", "y", "point"]);
        assert_eq!(
            table.rows(),
            [strings(&["1", "0", "s1"]), strings(&["3", "0", "s1"])]
        );
        assert_eq!(table.column("point"), Some(vec!["s1", "s1"]));
        assert_eq!(table.column("z"), None);
        Ok(())
    }

    #[test]
    fn test_concat_tables() -> Result<()> {
        let a = CsvTable::new(strings(&["x", "y"]), vec![strings(&["1", "2"])])?;
        let b = CsvTable::new(strings(&["z", "x"]), vec![strings(&["3", "4"])])?;
        let empty = CsvTable::new(strings(&["w"]), vec![])?;
        assert!(empty.is_empty());

        let combined = CsvTable::concat([a, empty, b]);
        assert_eq!(
            combined,
            CsvTable::new(
                strings(&["x", "y", "w", "z"]),
                vec![strings(&["1", "2", "", ""]), strings(&["4", "", "", "3"])],
            )?
        );
        Ok(())
    }
}
