//! Shared in-memory image of a row store.
//!
//! Both backends hold their live data in a [`StoreState`]; the file
//! backend additionally serializes it through `reldb_codec` on commit.

use crate::backend::{RowId, StoredRow};
use crate::error::{StoreError, StoreResult};
use reldb_codec::Value;
use std::collections::BTreeMap;

/// One relation table: columns, rows keyed by synthetic id, id counter.
#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: BTreeMap<u64, StoredRow>,
    pub(crate) next_rid: u64,
}

impl Table {
    fn new(columns: &[String]) -> Self {
        let mut columns = columns.to_vec();
        columns.sort();
        Self {
            columns,
            rows: BTreeMap::new(),
            next_rid: 1,
        }
    }

    fn check_row(&self, name: &str, row: &StoredRow) -> StoreResult<()> {
        let got: Vec<String> = row.keys().cloned().collect();
        if got != self.columns {
            return Err(StoreError::ColumnMismatch {
                name: name.to_string(),
                expected: self.columns.clone(),
                got,
            });
        }
        Ok(())
    }
}

/// The complete content of a store: relation tables plus metadata blobs.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    pub(crate) tables: BTreeMap<String, Table>,
    pub(crate) meta: BTreeMap<String, Vec<u8>>,
}

impl StoreState {
    pub(crate) fn create_rel(&mut self, name: &str, columns: &[String]) -> StoreResult<()> {
        if self.tables.contains_key(name) {
            return Err(StoreError::RelationExists {
                name: name.to_string(),
            });
        }
        self.tables.insert(name.to_string(), Table::new(columns));
        Ok(())
    }

    pub(crate) fn drop_rel(&mut self, name: &str) -> StoreResult<()> {
        self.tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::unknown_relation(name))
    }

    fn table(&self, name: &str) -> StoreResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::unknown_relation(name))
    }

    fn table_mut(&mut self, name: &str) -> StoreResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::unknown_relation(name))
    }

    pub(crate) fn bulk_replace(&mut self, name: &str, rows: Vec<StoredRow>) -> StoreResult<()> {
        let table = self.table_mut(name)?;
        for row in &rows {
            table.check_row(name, row)?;
        }
        table.rows.clear();
        for row in rows {
            let rid = table.next_rid;
            table.next_rid += 1;
            table.rows.insert(rid, row);
        }
        Ok(())
    }

    pub(crate) fn insert_rows(
        &mut self,
        name: &str,
        rows: Vec<StoredRow>,
    ) -> StoreResult<Vec<RowId>> {
        let table = self.table_mut(name)?;
        for row in &rows {
            table.check_row(name, row)?;
        }
        let mut rids = Vec::with_capacity(rows.len());
        for row in rows {
            let rid = table.next_rid;
            table.next_rid += 1;
            table.rows.insert(rid, row);
            rids.push(RowId::new(rid));
        }
        Ok(rids)
    }

    pub(crate) fn delete_rows(&mut self, name: &str, rids: &[RowId]) -> StoreResult<()> {
        let table = self.table_mut(name)?;
        for rid in rids {
            table.rows.remove(&rid.as_u64());
        }
        Ok(())
    }

    pub(crate) fn scan(&self, name: &str) -> StoreResult<Vec<(RowId, StoredRow)>> {
        let table = self.table(name)?;
        Ok(table
            .rows
            .iter()
            .map(|(rid, row)| (RowId::new(*rid), row.clone()))
            .collect())
    }

    pub(crate) fn relation_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub(crate) fn save_meta(&mut self, key: &str, bytes: &[u8]) {
        self.meta.insert(key.to_string(), bytes.to_vec());
    }

    pub(crate) fn load_meta(&self, key: &str) -> Option<Vec<u8>> {
        self.meta.get(key).cloned()
    }

    pub(crate) fn delete_meta(&mut self, key: &str) {
        self.meta.remove(key);
    }

    pub(crate) fn list_meta(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        self.meta
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Lowers the whole state to a codec value for the file backend.
    pub(crate) fn to_value(&self) -> Value {
        let meta = Value::Map(
            self.meta
                .iter()
                .map(|(k, v)| (k.clone(), Value::Bytes(v.clone())))
                .collect(),
        );
        let tables = Value::Map(
            self.tables
                .iter()
                .map(|(name, table)| {
                    let columns = Value::List(
                        table.columns.iter().map(|c| Value::from(c.as_str())).collect(),
                    );
                    let rows = Value::List(
                        table
                            .rows
                            .iter()
                            .map(|(rid, row)| {
                                let cells = Value::Map(
                                    row.iter()
                                        .map(|(c, b)| (c.clone(), Value::Bytes(b.clone())))
                                        .collect(),
                                );
                                Value::map(vec![
                                    ("rid", Value::Int(*rid as i64)),
                                    ("cells", cells),
                                ])
                            })
                            .collect(),
                    );
                    let table_value = Value::map(vec![
                        ("columns", columns),
                        ("next_rid", Value::Int(table.next_rid as i64)),
                        ("rows", rows),
                    ]);
                    (name.clone(), table_value)
                })
                .collect(),
        );
        Value::map(vec![("meta", meta), ("tables", tables)])
    }

    /// Rebuilds a state from its codec value.
    pub(crate) fn from_value(value: &Value) -> StoreResult<Self> {
        let meta_value = value
            .get("meta")
            .and_then(Value::as_map)
            .ok_or_else(|| StoreError::corrupted("missing meta section"))?;
        let mut meta = BTreeMap::new();
        for (key, blob) in meta_value {
            let bytes = blob
                .as_bytes()
                .ok_or_else(|| StoreError::corrupted(format!("meta entry {key:?} is not bytes")))?;
            meta.insert(key.clone(), bytes.to_vec());
        }

        let tables_value = value
            .get("tables")
            .and_then(Value::as_map)
            .ok_or_else(|| StoreError::corrupted("missing tables section"))?;
        let mut tables = BTreeMap::new();
        for (name, table_value) in tables_value {
            let columns = table_value
                .get("columns")
                .and_then(Value::as_list)
                .ok_or_else(|| StoreError::corrupted(format!("table {name:?} has no columns")))?
                .iter()
                .map(|c| {
                    c.as_text()
                        .map(str::to_string)
                        .ok_or_else(|| StoreError::corrupted("column name is not text"))
                })
                .collect::<StoreResult<Vec<_>>>()?;
            let next_rid = table_value
                .get("next_rid")
                .and_then(Value::as_int)
                .ok_or_else(|| StoreError::corrupted(format!("table {name:?} has no next_rid")))?;
            let mut rows = BTreeMap::new();
            for row_value in table_value
                .get("rows")
                .and_then(Value::as_list)
                .ok_or_else(|| StoreError::corrupted(format!("table {name:?} has no rows")))?
            {
                let rid = row_value
                    .get("rid")
                    .and_then(Value::as_int)
                    .ok_or_else(|| StoreError::corrupted("row has no rid"))?;
                let cells_value = row_value
                    .get("cells")
                    .and_then(Value::as_map)
                    .ok_or_else(|| StoreError::corrupted("row has no cells"))?;
                let mut cells = StoredRow::new();
                for (column, cell) in cells_value {
                    let bytes = cell
                        .as_bytes()
                        .ok_or_else(|| StoreError::corrupted("cell is not bytes"))?;
                    cells.insert(column.clone(), bytes.to_vec());
                }
                rows.insert(rid as u64, cells);
            }
            tables.insert(
                name.clone(),
                Table {
                    columns,
                    rows,
                    next_rid: next_rid as u64,
                },
            );
        }

        Ok(Self { tables, meta })
    }
}
