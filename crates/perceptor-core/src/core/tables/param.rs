use crate::core::models::ids::ParamId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("parameter id {0} out of range")]
    BadParam(ParamId),
    #[error("value type does not match column '{0}'")]
    KindMismatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
    Str,
}

/// A single cell value. Two values are duplicates for coalescing purposes
/// exactly when they compare equal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    fn default_for(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Int => Value::Int(0),
            ColumnKind::Float => Value::Float(0.0),
            ColumnKind::Str => Value::Str(String::new()),
        }
    }

    fn kind(&self) -> ColumnKind {
        match self {
            Value::Int(_) => ColumnKind::Int,
            Value::Float(_) => ColumnKind::Float,
            Value::Str(_) => ColumnKind::Str,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// A named, typed, row-oriented parameter table.
///
/// Rows are addressed by dense [`ParamId`]s assigned in insertion order. New
/// columns backfill existing rows with the column's default value (0, 0.0, or
/// the empty string).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table with the given (name, kind) columns and no rows.
    pub fn with_columns(columns: &[(&str, ColumnKind)]) -> Self {
        let mut table = Self::new();
        for (name, kind) in columns {
            // Construction-time duplicates are a programming error.
            table
                .add_column(name, *kind)
                .expect("duplicate column in table definition");
        }
        table
    }

    pub fn add_column(&mut self, name: &str, kind: ColumnKind) -> Result<usize, TableError> {
        if self.column_index(name).is_some() {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        self.columns.push(Column {
            name: name.to_string(),
            kind,
        });
        for row in &mut self.rows {
            row.push(Value::default_for(kind));
        }
        Ok(self.columns.len() - 1)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Appends a row of default values and returns its id.
    pub fn add_param(&mut self) -> ParamId {
        let row = self
            .columns
            .iter()
            .map(|c| Value::default_for(c.kind))
            .collect();
        self.rows.push(row);
        self.rows.len() - 1
    }

    pub fn param_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, param: ParamId) -> Option<&[Value]> {
        self.rows.get(param).map(|r| r.as_slice())
    }

    pub fn value(&self, param: ParamId, column: usize) -> Option<&Value> {
        self.rows.get(param).and_then(|r| r.get(column))
    }

    pub fn value_by_name(&self, param: ParamId, column: &str) -> Option<&Value> {
        self.value(param, self.column_index(column)?)
    }

    pub fn set_value(
        &mut self,
        param: ParamId,
        column: usize,
        value: Value,
    ) -> Result<(), TableError> {
        let kind = self
            .columns
            .get(column)
            .ok_or_else(|| TableError::UnknownColumn(column.to_string()))?
            .kind;
        if value.kind() != kind {
            return Err(TableError::KindMismatch(self.columns[column].name.clone()));
        }
        let row = self
            .rows
            .get_mut(param)
            .ok_or(TableError::BadParam(param))?;
        row[column] = value;
        Ok(())
    }

    pub fn set_value_by_name(
        &mut self,
        param: ParamId,
        column: &str,
        value: Value,
    ) -> Result<(), TableError> {
        let index = self
            .column_index(column)
            .ok_or_else(|| TableError::UnknownColumn(column.to_string()))?;
        self.set_value(param, index, value)
    }

    /// Deduplicates rows whose values all compare equal, keeping the first
    /// occurrence. Returns the old-id to new-id mapping, or `None` when the
    /// table was already duplicate-free.
    pub fn coalesce(&mut self) -> Option<Vec<ParamId>> {
        let mut remap = Vec::with_capacity(self.rows.len());
        let mut kept: Vec<Vec<Value>> = Vec::new();
        let mut changed = false;
        for row in &self.rows {
            match kept.iter().position(|k| k == row) {
                Some(existing) => {
                    remap.push(existing);
                    changed = true;
                }
                None => {
                    remap.push(kept.len());
                    kept.push(row.clone());
                }
            }
        }
        if !changed {
            return None;
        }
        self.rows = kept;
        Some(remap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column_table() -> ParamTable {
        ParamTable::with_columns(&[("fc", ColumnKind::Float), ("r0", ColumnKind::Float)])
    }

    #[test]
    fn add_param_fills_defaults() {
        let mut table = two_column_table();
        let p = table.add_param();
        assert_eq!(p, 0);
        assert_eq!(table.value(p, 0), Some(&Value::Float(0.0)));
        assert_eq!(table.value_by_name(p, "r0"), Some(&Value::Float(0.0)));
    }

    #[test]
    fn set_value_rejects_kind_mismatch() {
        let mut table = two_column_table();
        let p = table.add_param();
        let err = table.set_value_by_name(p, "fc", Value::Int(3)).unwrap_err();
        assert_eq!(err, TableError::KindMismatch("fc".to_string()));
    }

    #[test]
    fn add_column_backfills_existing_rows() {
        let mut table = two_column_table();
        let p = table.add_param();
        table.set_value_by_name(p, "fc", Value::Float(1.5)).unwrap();
        table.add_column("type", ColumnKind::Str).unwrap();
        assert_eq!(
            table.value_by_name(p, "type"),
            Some(&Value::Str(String::new()))
        );
        assert_eq!(table.value_by_name(p, "fc"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn duplicate_column_is_rejected() {
        let mut table = two_column_table();
        assert_eq!(
            table.add_column("fc", ColumnKind::Int).unwrap_err(),
            TableError::DuplicateColumn("fc".to_string())
        );
    }

    #[test]
    fn coalesce_merges_equal_rows_and_reports_remap() {
        let mut table = two_column_table();
        for (fc, r0) in [(1.0, 2.0), (3.0, 4.0), (1.0, 2.0)] {
            let p = table.add_param();
            table.set_value_by_name(p, "fc", Value::Float(fc)).unwrap();
            table.set_value_by_name(p, "r0", Value::Float(r0)).unwrap();
        }
        let remap = table.coalesce().unwrap();
        assert_eq!(remap, vec![0, 1, 0]);
        assert_eq!(table.param_count(), 2);
        // Already coalesced: second pass is a no-op.
        assert!(table.coalesce().is_none());
    }
}
