//! Values that flow between pipeline steps.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{SwError, SwResult};
use crate::fingerprint::{Fingerprint, FingerprintBuilder};

/// A single vector of numbers, typically a target or prediction column.
pub type ColumnData = Vec<f64>;

/// Named map of values, the unit passed to step `fit`/`apply` and the
/// external-input binding of the executor.
pub type NamedValues = BTreeMap<String, Value>;

/// A small in-memory table of named `f64` columns. NaN encodes a missing
/// cell. All columns have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    column_names: Vec<String>,
    columns: Vec<ColumnData>,
}

impl Table {
    /// Build a table from parallel name and column lists. All columns must
    /// have equal length.
    pub fn new(column_names: Vec<String>, columns: Vec<ColumnData>) -> SwResult<Self> {
        if column_names.len() != columns.len() {
            return Err(SwError::Validation(format!(
                "table has {} names for {} columns",
                column_names.len(),
                columns.len()
            )));
        }
        if let Some(first) = columns.first() {
            for (name, col) in column_names.iter().zip(&columns) {
                if col.len() != first.len() {
                    return Err(SwError::Validation(format!(
                        "column {} has {} rows, expected {}",
                        name,
                        col.len(),
                        first.len()
                    )));
                }
            }
        }
        Ok(Self {
            column_names,
            columns,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// One row as a dense vector, in column order.
    pub fn row(&self, index: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[index]).collect()
    }

    /// A new table holding the given rows, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|col| indices.iter().map(|&i| col[i]).collect())
            .collect();
        Self {
            column_names: self.column_names.clone(),
            columns,
        }
    }

    /// A new table keeping only the given columns, in the given order.
    pub fn take_columns(&self, indices: &[usize]) -> Self {
        Self {
            column_names: indices
                .iter()
                .map(|&i| self.column_names[i].clone())
                .collect(),
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
        }
    }

    /// Content digest over column names and cell values.
    pub fn digest(&self) -> Fingerprint {
        let mut builder = FingerprintBuilder::new();
        builder.update_str("table");
        for (name, col) in self.column_names.iter().zip(&self.columns) {
            builder.update_str(name);
            builder.update(&(col.len() as u64).to_le_bytes());
            for &v in col {
                builder.update_f64(v);
            }
        }
        builder.finish()
    }
}

/// The unit of data exchanged between steps. Payloads are `Arc`-shared so
/// cloning a value is cheap.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Table(Arc<Table>),
    Column(Arc<ColumnData>),
    Scalar(f64),
}

impl Value {
    pub fn table(table: Table) -> Self {
        Value::Table(Arc::new(table))
    }

    pub fn column(column: ColumnData) -> Self {
        Value::Column(Arc::new(column))
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_column(&self) -> Option<&[f64]> {
        match self {
            Value::Column(c) => Some(c.as_slice()),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Number of rows carried by this value, where meaningful.
    pub fn n_rows(&self) -> usize {
        match self {
            Value::Table(t) => t.n_rows(),
            Value::Column(c) => c.len(),
            Value::Scalar(_) => 1,
        }
    }

    /// Content digest; the input-identity half of a step fingerprint.
    pub fn digest(&self) -> Fingerprint {
        match self {
            Value::Table(t) => t.digest(),
            Value::Column(c) => {
                let mut builder = FingerprintBuilder::new();
                builder.update_str("column");
                builder.update(&(c.len() as u64).to_le_bytes());
                for &v in c.iter() {
                    builder.update_f64(v);
                }
                builder.finish()
            }
            Value::Scalar(v) => {
                let mut builder = FingerprintBuilder::new();
                builder.update_str("scalar");
                builder.update_f64(*v);
                builder.finish()
            }
        }
    }
}
