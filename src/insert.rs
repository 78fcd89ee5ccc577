//! Insertion pipeline - object graphs to parent-linked rows.
//!
//! Values are extracted level by level: each referenced child is queued with
//! its parent's (uid, table) linkage while the parent row records only the
//! child's dynamic type tag. Rows are grouped by target table across the whole
//! batch, so a thousand inserted parents with children split over two concrete
//! subtypes produce one prepared statement per table, not one per row. All
//! rows bound for the same store file are written in one immediate
//! transaction.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::params_from_iter;
use uuid::Uuid;

use crate::codec::BlobCodec;
use crate::model::{ErasedModel, FieldValue, Model};
use crate::pool::ConnectionPool;
use crate::schema::registry::Registry;
use crate::schema::table::{RESERVED_COLUMNS, TableMap};
use crate::value::Value;
use crate::{Error, Result};

/// Seconds since the Unix epoch, as stored in `expires_at`
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Random fixed-length row identifier
pub(crate) fn generate_uid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Insert a single object graph.
pub fn insert<T: Model>(registry: &Registry, obj: &T, expires_at: Option<f64>) -> Result<()> {
    insert_erased(registry, &[obj as &dyn ErasedModel], expires_at)
}

/// Insert a batch of object graphs, grouping rows by table at every depth
/// level.
pub fn insert_many<T: Model>(registry: &Registry, objs: &[T], expires_at: Option<f64>) -> Result<()> {
    if objs.is_empty() {
        return Ok(());
    }
    let erased: Vec<&dyn ErasedModel> = objs.iter().map(|o| o as &dyn ErasedModel).collect();
    insert_erased(registry, &erased, expires_at)
}

fn insert_erased(
    registry: &Registry,
    objs: &[&dyn ErasedModel],
    expires_at: Option<f64>,
) -> Result<()> {
    if let Some(ts) = expires_at {
        if ts <= unix_now() {
            return Err(Error::Expiry(format!(
                "expiry timestamp {} is not in the future",
                ts
            )));
        }
    }

    let tables = registry.tables_snapshot();
    let codec = registry.codec().as_ref();
    let write_set = build_write_set(&tables, codec, expires_at, objs)?;
    execute_write_set(&tables, write_set)
}

/// Rows per table, in first-seen table order
type WriteSet = Vec<(&'static str, Vec<Vec<Value>>)>;

fn build_write_set(
    tables: &TableMap,
    codec: &dyn BlobCodec,
    expires_at: Option<f64>,
    objs: &[&dyn ErasedModel],
) -> Result<WriteSet> {
    let mut out: WriteSet = Vec::new();
    let mut next: Vec<(Box<dyn ErasedModel>, (String, &'static str))> = Vec::new();

    for obj in objs {
        let (table, row) = build_row(tables, codec, expires_at, *obj, None, &mut next)?;
        push_row(&mut out, table, row);
    }

    // one level at a time: children of the whole batch stay grouped together
    while !next.is_empty() {
        for (child, parent) in std::mem::take(&mut next) {
            let (table, row) =
                build_row(tables, codec, expires_at, child.as_ref(), Some(parent), &mut next)?;
            push_row(&mut out, table, row);
        }
    }

    Ok(out)
}

fn build_row(
    tables: &TableMap,
    codec: &dyn BlobCodec,
    expires_at: Option<f64>,
    obj: &dyn ErasedModel,
    parent: Option<(String, &'static str)>,
    next: &mut Vec<(Box<dyn ErasedModel>, (String, &'static str))>,
) -> Result<(&'static str, Vec<Value>)> {
    let table = tables
        .get(obj.tag())
        .ok_or_else(|| Error::UnknownType(obj.tag().to_string()))?;

    let uid = generate_uid();
    let (parent_uid, parent_table) = match parent {
        Some((puid, ptable)) => (Value::Text(puid), Value::Text(ptable.to_string())),
        None => (Value::Null, Value::Null),
    };

    let mut row = vec![
        Value::Text(uid.clone()),
        parent_uid,
        parent_table,
        Value::from(expires_at),
    ];

    for value in obj.values(codec)? {
        match value {
            FieldValue::Scalar(v) => row.push(v),
            FieldValue::Child(None) => row.push(Value::Null),
            FieldValue::Child(Some(child)) => {
                let tag = child.tag();
                if !tables.contains_key(tag) {
                    return Err(Error::UnknownType(tag.to_string()));
                }
                row.push(Value::Text(tag.to_string()));
                next.push((child, (uid.clone(), table.name())));
            }
        }
    }

    let expected = RESERVED_COLUMNS.len() + table.fields().len();
    if row.len() != expected {
        return Err(Error::BadType(format!(
            "type {} extracted {} values for {} declared fields",
            table.name(),
            row.len() - RESERVED_COLUMNS.len(),
            table.fields().len()
        )));
    }

    Ok((table.name(), row))
}

fn push_row(out: &mut WriteSet, table: &'static str, row: Vec<Value>) {
    match out.iter_mut().find(|(name, _)| *name == table) {
        Some((_, rows)) => rows.push(row),
        None => out.push((table, vec![row])),
    }
}

fn execute_write_set(tables: &TableMap, write_set: WriteSet) -> Result<()> {
    // group tables sharing a store file so each file gets one transaction
    let mut by_pool: Vec<(Arc<ConnectionPool>, Vec<(&'static str, Vec<Vec<Value>>)>)> = Vec::new();
    for (name, rows) in write_set {
        let pool = tables[name].pool()?.clone();
        match by_pool
            .iter_mut()
            .find(|(p, _)| Arc::ptr_eq(p, &pool))
        {
            Some((_, entries)) => entries.push((name, rows)),
            None => by_pool.push((pool, vec![(name, rows)])),
        }
    }

    for (pool, entries) in by_pool {
        let mut conn = pool.acquire()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        for (name, rows) in entries {
            let table = &tables[name];
            let mut stmt = tx.prepare(&table.insert_statement())?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
    }
    Ok(())
}
