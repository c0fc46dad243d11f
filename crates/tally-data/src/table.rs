//! Columnar event tables.

use std::collections::{BTreeMap, BTreeSet};

use tally_core::{Error, Result};

/// Named `f64` columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: BTreeMap<String, Vec<f64>>,
    n_rows: usize,
}

impl Table {
    /// An empty table with no columns and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, data)` pairs; all columns must have equal length.
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut table = Table::new();
        for (name, data) in columns {
            table.insert_column(name, data)?;
        }
        Ok(table)
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column names in sorted order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Borrow one column.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::Data(format!("missing column '{}'", name)))
    }

    /// Insert or replace a column.
    pub fn insert_column(&mut self, name: impl Into<String>, data: Vec<f64>) -> Result<()> {
        let name = name.into();
        let replacing = self.columns.contains_key(&name);
        let only_column = replacing && self.columns.len() == 1;
        if !self.columns.is_empty() && !only_column && data.len() != self.n_rows {
            return Err(Error::Data(format!(
                "column '{}' has {} rows, table has {}",
                name,
                data.len(),
                self.n_rows
            )));
        }
        self.n_rows = data.len();
        self.columns.insert(name, data);
        Ok(())
    }

    /// A new table holding only the requested columns.
    pub fn select(&self, properties: &BTreeSet<String>) -> Result<Table> {
        let mut out = Table { columns: BTreeMap::new(), n_rows: self.n_rows };
        for p in properties {
            out.columns.insert(p.clone(), self.column(p)?.to_vec());
        }
        Ok(out)
    }

    /// Append the rows of `other`. Both tables must have the same columns.
    pub fn append(&mut self, other: Table) -> Result<()> {
        if self.columns.is_empty() && self.n_rows == 0 {
            *self = other;
            return Ok(());
        }
        if !self.columns.keys().eq(other.columns.keys()) {
            return Err(Error::Data("cannot append tables with different columns".to_string()));
        }
        for (name, data) in other.columns {
            if let Some(col) = self.columns.get_mut(&name) {
                col.extend(data);
            }
        }
        self.n_rows += other.n_rows;
        Ok(())
    }

    /// Approximate heap footprint in bytes.
    pub fn approx_bytes(&self) -> usize {
        self.columns
            .iter()
            .map(|(k, v)| k.len() + v.len() * std::mem::size_of::<f64>())
            .sum()
    }
}
