//! The aligned table: one row per index value, one column per data source,
//! plus the computed `final` column.
//!
//! Storage layout is `indx`, `final`, `override_feed000`, `feed001`..,
//! `failsafe_feed999`. In memory, data columns are kept in aggregation
//! precedence order: override, feeds by ascending fnum, failsafe.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::{
    column_name, DataKind, DataKindError, IndexError, IndexKind, IndexValue, Point, Series,
};

pub const INDEX_COLUMN: &str = "indx";
pub const FINAL_COLUMN: &str = "final";
pub const OVERRIDE_COLUMN: &str = "override_feed000";
pub const FAILSAFE_COLUMN: &str = "failsafe_feed999";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("unrecognised column '{0}'")]
    UnknownColumn(String),

    #[error("stored table is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("row {row} has {got} cells, schema has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Data(#[from] DataKindError),

    #[error("table serialization: {0}")]
    Serialize(String),
}

/// What a data column holds. The derived order is the precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    Override,
    Feed(u32),
    FailSafe,
}

impl ColumnRole {
    pub fn name(&self) -> String {
        match self {
            ColumnRole::Override => OVERRIDE_COLUMN.to_string(),
            ColumnRole::Feed(fnum) => column_name(*fnum),
            ColumnRole::FailSafe => FAILSAFE_COLUMN.to_string(),
        }
    }

    pub fn parse(name: &str) -> Result<ColumnRole, TableError> {
        let unknown = || TableError::UnknownColumn(name.to_string());
        match name {
            OVERRIDE_COLUMN => Ok(ColumnRole::Override),
            FAILSAFE_COLUMN => Ok(ColumnRole::FailSafe),
            other => {
                let digits = other.strip_prefix("feed").ok_or_else(unknown)?;
                if digits.len() < 3 {
                    return Err(unknown());
                }
                let n: u32 = digits.parse().map_err(|_| unknown())?;
                n.checked_sub(1).map(ColumnRole::Feed).ok_or_else(unknown)
            }
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub role: ColumnRole,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedTable {
    pub index_kind: IndexKind,
    pub index: Vec<IndexValue>,
    pub columns: Vec<Column>,
    pub final_values: Vec<Option<f64>>,
}

impl AlignedTable {
    /// A table with the given index and no data columns.
    pub fn new(index_kind: IndexKind, index: Vec<IndexValue>) -> Self {
        let n = index.len();
        Self {
            index_kind,
            index,
            columns: Vec::new(),
            final_values: vec![None; n],
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sort data columns into precedence order.
    pub fn sort_columns(&mut self) {
        self.columns.sort_by_key(|c| c.role);
    }

    pub fn column(&self, role: ColumnRole) -> Option<&Column> {
        self.columns.iter().find(|c| c.role == role)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&[Option<f64>]> {
        if name == FINAL_COLUMN {
            return Some(&self.final_values);
        }
        let role = ColumnRole::parse(name).ok()?;
        self.column(role).map(|c| c.values.as_slice())
    }

    pub fn feed_columns(&self) -> impl Iterator<Item = &Column> + '_ {
        self.columns
            .iter()
            .filter(|c| matches!(c.role, ColumnRole::Feed(_)))
    }

    /// Position of an index value.
    pub fn position(&self, index: &IndexValue) -> Option<usize> {
        self.index.binary_search(index).ok()
    }

    /// Index plus `final`, the Symbol's canonical series.
    pub fn final_series(&self, name: &str) -> Series {
        Series::new(
            name,
            self.index
                .iter()
                .zip(&self.final_values)
                .map(|(i, v)| Point {
                    index: i.clone(),
                    value: *v,
                })
                .collect(),
        )
    }

    /// Column names in storage order.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![INDEX_COLUMN.to_string(), FINAL_COLUMN.to_string()];
        names.extend(self.columns.iter().map(|c| c.role.name()));
        names
    }

    pub fn schema(&self, data_kind: DataKind) -> TableSchema {
        TableSchema {
            index_kind: self.index_kind,
            data_kind,
            columns: self.column_names(),
        }
    }

    /// BLAKE3 hex digest of the table contents.
    pub fn fingerprint(&self) -> Result<String, TableError> {
        let bytes = serde_json::to_vec(self).map_err(|e| TableError::Serialize(e.to_string()))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Encode for a storage backend.
    pub fn to_storage(&self, data_kind: DataKind) -> StoredTable {
        let rows = (0..self.len())
            .map(|i| {
                let mut row = Vec::with_capacity(self.columns.len() + 2);
                row.push(self.index_kind.to_storage(&self.index[i]));
                row.push(data_kind.to_storage(self.final_values[i]));
                row.extend(self.columns.iter().map(|c| data_kind.to_storage(c.values[i])));
                row
            })
            .collect();
        StoredTable {
            schema: self.schema(data_kind),
            rows,
        }
    }

    /// Decode a stored table.
    pub fn from_storage(stored: &StoredTable) -> Result<AlignedTable, TableError> {
        let schema = &stored.schema;
        if schema.columns.first().map(String::as_str) != Some(INDEX_COLUMN) {
            return Err(TableError::MissingColumn(INDEX_COLUMN));
        }
        if schema.columns.get(1).map(String::as_str) != Some(FINAL_COLUMN) {
            return Err(TableError::MissingColumn(FINAL_COLUMN));
        }
        let roles = schema.columns[2..]
            .iter()
            .map(|n| ColumnRole::parse(n))
            .collect::<Result<Vec<_>, _>>()?;

        let width = schema.columns.len();
        let mut index = Vec::with_capacity(stored.rows.len());
        let mut final_values = Vec::with_capacity(stored.rows.len());
        let mut columns: Vec<Column> = roles
            .iter()
            .map(|role| Column {
                role: *role,
                values: Vec::with_capacity(stored.rows.len()),
            })
            .collect();

        for (r, row) in stored.rows.iter().enumerate() {
            if row.len() != width {
                return Err(TableError::RowWidth {
                    row: r,
                    expected: width,
                    got: row.len(),
                });
            }
            index.push(schema.index_kind.from_storage(&row[0])?);
            final_values.push(schema.data_kind.from_storage(&row[1])?);
            for (col, cell) in columns.iter_mut().zip(&row[2..]) {
                col.values.push(schema.data_kind.from_storage(cell)?);
            }
        }

        let mut table = AlignedTable {
            index_kind: schema.index_kind,
            index,
            columns,
            final_values,
        };
        table.sort_columns();
        Ok(table)
    }
}

/// Expected shape of a Symbol's stored table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub index_kind: IndexKind,
    pub data_kind: DataKind,
    pub columns: Vec<String>,
}

impl TableSchema {
    /// Column type declarations, as a SQL backend would create them.
    pub fn column_types(&self) -> Vec<(String, &'static str)> {
        self.columns
            .iter()
            .map(|c| {
                let ty = if c == INDEX_COLUMN {
                    self.index_kind.storage_type()
                } else {
                    self.data_kind.storage_type()
                };
                (c.clone(), ty)
            })
            .collect()
    }
}

/// A table encoded for storage: rows of cells in `schema.columns` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTable {
    pub schema: TableSchema,
    pub rows: Vec<Vec<serde_json::Value>>,
}
