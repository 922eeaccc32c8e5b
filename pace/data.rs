//! # Dataset Loading and Validation
//!
//! This module is the only entry point for user-provided data. It reads a tabular file,
//! validates that every cell is a finite number, and produces a [`Dataset`]: a design matrix
//! whose first column is the constant bias term and a target vector taken from the last
//! column of the file.
//!
//! - Formats: `.arff` files are parsed here (numeric and nominal attributes; the `@data`
//!   section goes through the `csv` crate). `.tsv` files and everything else are read with
//!   `polars`, tab or comma separated, with a header row.
//! - Errors: failures are assumed to be user-input errors. `DataError` carries enough
//!   context to point at the offending column or line.

use crate::split::Subset;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A validated dataset ready for splitting and fitting.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Design matrix. Column 0 is always 1.0, columns 1.. are the raw features.
    x: Array2<f64>,
    /// Target vector aligned with the rows of `x`.
    y: Array1<f64>,
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed ARFF data row: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Internal shape error while assembling the data table: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing values were found in column '{0}'. This tool requires complete data with no missing values."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in column '{0}'. This tool requires all data to be finite."
    )]
    NonFiniteValuesFound(String),
    #[error("The input contains no data rows or no columns.")]
    EmptyDataset,
    #[error("The feature matrix has {rows} rows but {targets} targets were given.")]
    MismatchedTargets { rows: usize, targets: usize },
    #[error("ARFF syntax error on line {line}: {message}")]
    ArffSyntax { line: usize, message: String },
    #[error("ARFF data row on line {line} has {found} values, but {expected} attributes were declared.")]
    ArffWidthMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("Value '{value}' is not declared for nominal attribute '{attribute}'.")]
    UnknownNominalValue { attribute: String, value: String },
}

impl Dataset {
    /// Builds a dataset from a raw table. The last column is the target, every preceding
    /// column is a feature, and a bias column of ones is prepended to the features.
    pub fn from_table(table: ArrayView2<f64>) -> Result<Self, DataError> {
        let (n_rows, n_cols) = table.dim();
        if n_rows == 0 || n_cols == 0 {
            return Err(DataError::EmptyDataset);
        }
        let features = table.slice(s![.., ..n_cols - 1]);
        let targets = table.column(n_cols - 1);
        Self::from_parts(features, targets)
    }

    /// Builds a dataset from a feature matrix (without bias) and a target vector.
    pub fn from_parts(
        features: ArrayView2<f64>,
        targets: ArrayView1<f64>,
    ) -> Result<Self, DataError> {
        let n_rows = features.nrows();
        if n_rows == 0 {
            return Err(DataError::EmptyDataset);
        }
        if targets.len() != n_rows {
            return Err(DataError::MismatchedTargets {
                rows: n_rows,
                targets: targets.len(),
            });
        }
        for (j, column) in features.axis_iter(Axis(1)).enumerate() {
            if column.iter().any(|v| !v.is_finite()) {
                return Err(DataError::NonFiniteValuesFound(format!("feature {}", j + 1)));
            }
        }
        if targets.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound("target".to_string()));
        }

        let mut x = Array2::<f64>::ones((n_rows, features.ncols() + 1));
        x.slice_mut(s![.., 1..]).assign(&features);
        Ok(Self {
            x,
            y: targets.to_owned(),
        })
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn num_rows(&self) -> usize {
        self.y.len()
    }

    /// Width of the design matrix, bias column included.
    pub fn num_columns(&self) -> usize {
        self.x.ncols()
    }

    /// Number of raw input features (the design matrix width minus the bias column).
    pub fn num_features(&self) -> usize {
        self.x.ncols() - 1
    }

    /// A view over the given rows. No row data is copied.
    pub fn subset(&self, indices: &[usize]) -> Subset<'_> {
        Subset::new(self, indices.to_vec())
    }

    /// A view over every row, in storage order.
    pub fn full(&self) -> Subset<'_> {
        Subset::new(self, (0..self.num_rows()).collect())
    }
}

/// Loads a dataset, choosing the parser from the file extension.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset, DataError> {
    let path = path.as_ref();
    log::info!("Loading data from '{}'", path.display());

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let table = match extension.as_deref() {
        Some("arff") => {
            let text = std::fs::read_to_string(path)?;
            arff::parse(&text)?
        }
        Some("tsv") | Some("tab") => internal::read_delimited(path, b'\t')?,
        _ => internal::read_delimited(path, b',')?,
    };

    let dataset = Dataset::from_table(table.view())?;
    log::info!(
        "Loaded {} rows with {} features (plus bias) from '{}'",
        dataset.num_rows(),
        dataset.num_features(),
        path.display()
    );
    Ok(dataset)
}

/// Delimited text files read through polars.
mod internal {
    use super::*;

    fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }

        let casted = series
            .cast(&DataType::Float64)
            .map_err(|_| DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            })?;

        // A non-strict cast turns unparsable strings into nulls.
        if casted.null_count() > 0 {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }

        let chunked = casted.f64()?.rechunk();
        let values: Vec<f64> = chunked.into_no_null_iter().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
        }
        Ok(values)
    }

    pub(super) fn read_delimited(path: &Path, separator: u8) -> Result<Array2<f64>, DataError> {
        let df = CsvReader::new(File::open(path)?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(separator)),
            )
            .finish()?;

        let n_rows = df.height();
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        if n_rows == 0 || names.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        let mut table = Array2::<f64>::zeros((n_rows, names.len()));
        for (j, name) in names.iter().enumerate() {
            let values = extract_numeric_column(&df, name)?;
            table.column_mut(j).assign(&Array1::from_vec(values));
        }
        Ok(table)
    }
}

/// A reader for the attribute-relation file format: a header of `@attribute` declarations
/// followed by comma separated `@data` rows. Sparse rows and string/date attributes are
/// rejected. Nominal values are encoded as their position in the declaration.
mod arff {
    use super::DataError;
    use ndarray::Array2;

    #[derive(Debug)]
    enum AttributeKind {
        Numeric,
        Nominal(Vec<String>),
    }

    #[derive(Debug)]
    struct Attribute {
        name: String,
        kind: AttributeKind,
    }

    impl Attribute {
        fn encode(&self, raw: &str, line: usize) -> Result<f64, DataError> {
            let value = unquote(raw);
            if value == "?" {
                return Err(DataError::MissingValuesFound(self.name.clone()));
            }
            match &self.kind {
                AttributeKind::Numeric => {
                    let parsed = value.parse::<f64>().map_err(|_| DataError::ColumnWrongType {
                        column_name: self.name.clone(),
                        expected_type: "f64 (numeric)",
                        found_type: format!("'{value}' on line {line}"),
                    })?;
                    if !parsed.is_finite() {
                        return Err(DataError::NonFiniteValuesFound(self.name.clone()));
                    }
                    Ok(parsed)
                }
                AttributeKind::Nominal(labels) => labels
                    .iter()
                    .position(|label| label == value)
                    .map(|p| p as f64)
                    .ok_or_else(|| DataError::UnknownNominalValue {
                        attribute: self.name.clone(),
                        value: value.to_string(),
                    }),
            }
        }
    }

    fn unquote(raw: &str) -> &str {
        let trimmed = raw.trim();
        for quote in ['\'', '"'] {
            if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
                return &trimmed[1..trimmed.len() - 1];
            }
        }
        trimmed
    }

    fn syntax(line: usize, message: impl Into<String>) -> DataError {
        DataError::ArffSyntax {
            line,
            message: message.into(),
        }
    }

    /// Splits `name type` where the name may be quoted.
    fn parse_attribute(declaration: &str, line: usize) -> Result<Attribute, DataError> {
        let declaration = declaration.trim();
        let (name, rest) = match declaration.chars().next() {
            Some(quote @ ('\'' | '"')) => {
                let close = declaration[1..]
                    .find(quote)
                    .ok_or_else(|| syntax(line, "unterminated quoted attribute name"))?;
                (&declaration[1..close + 1], &declaration[close + 2..])
            }
            Some(_) => declaration
                .split_once(char::is_whitespace)
                .ok_or_else(|| syntax(line, "attribute declaration has no type"))?,
            None => return Err(syntax(line, "empty attribute declaration")),
        };

        let kind_text = rest.trim();
        let kind = match kind_text.to_ascii_lowercase().as_str() {
            "numeric" | "real" | "integer" => AttributeKind::Numeric,
            lowered if lowered.starts_with('{') && lowered.ends_with('}') => {
                let inner = &kind_text[1..kind_text.len() - 1];
                AttributeKind::Nominal(inner.split(',').map(|v| unquote(v).to_string()).collect())
            }
            other => {
                return Err(syntax(
                    line,
                    format!("unsupported attribute type '{other}' for '{name}'"),
                ));
            }
        };

        Ok(Attribute {
            name: name.to_string(),
            kind,
        })
    }

    pub(super) fn parse(text: &str) -> Result<Array2<f64>, DataError> {
        let mut attributes = Vec::new();
        let mut data_start = None;

        for (i, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('%') {
                continue;
            }
            let lowered = line.to_ascii_lowercase();
            if lowered.starts_with("@relation") {
                continue;
            } else if lowered.starts_with("@attribute") {
                attributes.push(parse_attribute(&line["@attribute".len()..], i + 1)?);
            } else if lowered.starts_with("@data") {
                data_start = Some(i + 1);
                break;
            } else {
                return Err(syntax(i + 1, format!("unexpected header line '{line}'")));
            }
        }

        let data_start = data_start.ok_or_else(|| syntax(text.lines().count(), "missing @data section"))?;
        if attributes.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        let data_section: String = text
            .lines()
            .skip(data_start)
            .collect::<Vec<_>>()
            .join("\n");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'%'))
            .quote(b'\'')
            .trim(csv::Trim::All)
            .from_reader(data_section.as_bytes());

        let mut values = Vec::new();
        let mut n_rows = 0;
        for record in reader.records() {
            let record = record?;
            let line = data_start + record.position().map_or(0, |p| p.line() as usize);
            if record.len() == 1 && record[0].is_empty() {
                continue;
            }
            if record.get(0).is_some_and(|first| first.starts_with('{')) {
                return Err(syntax(line, "sparse ARFF rows are not supported"));
            }
            if record.len() != attributes.len() {
                return Err(DataError::ArffWidthMismatch {
                    line,
                    expected: attributes.len(),
                    found: record.len(),
                });
            }
            for (attribute, field) in attributes.iter().zip(record.iter()) {
                values.push(attribute.encode(field, line)?);
            }
            n_rows += 1;
        }

        if n_rows == 0 {
            return Err(DataError::EmptyDataset);
        }
        Ok(Array2::from_shape_vec((n_rows, attributes.len()), values)?)
    }
}
