//! Query results.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::protocol::response::{ColumnDefinition, OkPacket};
use crate::value::Value;

/// A row keyed by column name. Later duplicate names win.
pub type Record = HashMap<String, Value>;

/// Rows returned by a query, with their column metadata.
///
/// `rows()` is the table view: one `Vec<Value>` per row, in column order.
/// `records()` is built from it on first access and cached.
#[derive(Debug)]
pub struct ResultSet {
    columns: Vec<ColumnDefinition>,
    rows: Vec<Vec<Value>>,
    status: OkPacket,
    records: OnceLock<Vec<Record>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnDefinition>, rows: Vec<Vec<Value>>, status: OkPacket) -> Self {
        Self {
            columns,
            rows,
            status,
            records: OnceLock::new(),
        }
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Status of the packet that terminated the result set.
    pub fn status(&self) -> &OkPacket {
        &self.status
    }

    /// Rows as name-keyed records.
    pub fn records(&self) -> &[Record] {
        self.records.get_or_init(|| {
            self.rows
                .iter()
                .map(|row| {
                    self.columns
                        .iter()
                        .zip(row.iter())
                        .map(|(column, value)| (column.name.clone(), value.clone()))
                        .collect()
                })
                .collect()
        })
    }
}

/// Outcome of a query: either rows or a plain OK.
#[derive(Debug)]
pub enum QueryResult {
    Rows(ResultSet),
    Ok(OkPacket),
}

impl QueryResult {
    pub fn result_set(&self) -> Option<&ResultSet> {
        match self {
            QueryResult::Rows(rs) => Some(rs),
            QueryResult::Ok(_) => None,
        }
    }

    pub fn into_result_set(self) -> Option<ResultSet> {
        match self {
            QueryResult::Rows(rs) => Some(rs),
            QueryResult::Ok(_) => None,
        }
    }

    /// The OK packet, or the terminating status of a result set.
    pub fn ok_packet(&self) -> &OkPacket {
        match self {
            QueryResult::Rows(rs) => rs.status(),
            QueryResult::Ok(ok) => ok,
        }
    }

    pub fn affected_rows(&self) -> u64 {
        self.ok_packet().affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.ok_packet().last_insert_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constant::ColumnType;

    fn sample() -> ResultSet {
        ResultSet::new(
            vec![
                ColumnDefinition::new("id", ColumnType::Long),
                ColumnDefinition::new("name", ColumnType::VarString),
                ColumnDefinition::new("id", ColumnType::Long),
            ],
            vec![
                vec![Value::Int(1), Value::Text("a".into()), Value::Int(10)],
                vec![Value::Int(2), Value::Null, Value::Int(20)],
            ],
            OkPacket::default(),
        )
    }

    #[test]
    fn test_records_are_cached() {
        let rs = sample();
        let first = rs.records().as_ptr();
        let second = rs.records().as_ptr();
        assert_eq!(first, second);
        assert_eq!(rs.records().len(), 2);
    }

    #[test]
    fn test_records_last_duplicate_wins() {
        let rs = sample();
        let records = rs.records();
        assert_eq!(records[0]["id"], Value::Int(10));
        assert_eq!(records[0]["name"], Value::Text("a".into()));
        assert_eq!(records[1]["name"], Value::Null);
        assert_eq!(rs.rows()[1][0], Value::Int(2));
    }

    #[test]
    fn test_query_result_accessors() {
        let ok = QueryResult::Ok(OkPacket {
            affected_rows: 3,
            last_insert_id: 9,
            ..Default::default()
        });
        assert!(ok.result_set().is_none());
        assert_eq!(ok.affected_rows(), 3);
        assert_eq!(ok.last_insert_id(), 9);

        let rows = QueryResult::Rows(sample());
        assert_eq!(rows.result_set().map(ResultSet::len), Some(2));
        assert_eq!(
            rows.into_result_set().unwrap().column_names().collect::<Vec<_>>(),
            vec!["id", "name", "id"]
        );
    }
}
