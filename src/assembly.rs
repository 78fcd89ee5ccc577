//! Assembler - reconstructs object graphs from rows.
//!
//! Child lookups are batched to avoid one query per parent row: for each
//! distinct dynamic type tag appearing anywhere in the input batch, a single
//! query fetches all child rows owned by the batch's parents, ordered by
//! rowid so repeated fields of the same child type distribute in declared
//! order. Assembly then recurses per child table through the erased entry
//! point recorded in its shape.

use std::any::Any;
use std::collections::{HashMap, VecDeque};

use crate::codec::BlobCodec;
use crate::model::{Model, RowReader, Slot};
use crate::model::AssembledChild;
use crate::schema::table::{BIND_CHUNK, Row, TableMap};
use crate::value::Value;
use crate::{Error, Result};

/// Assemble a single row into an instance.
pub fn assemble<T: Model>(tables: &TableMap, codec: &dyn BlobCodec, row: Row) -> Result<T> {
    let mut out = assemble_many(tables, codec, vec![row])?;
    out.pop()
        .ok_or_else(|| Error::Assembly("assembly of one row produced nothing".into()))
}

/// Assemble a batch of rows, fetching children one query per distinct tag.
pub fn assemble_many<T: Model>(
    tables: &TableMap,
    codec: &dyn BlobCodec,
    rows: Vec<Row>,
) -> Result<Vec<T>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let table = tables
        .get(T::type_name())
        .ok_or_else(|| Error::UnknownType(T::type_name().to_string()))?;
    let ref_columns = table.reference_columns();

    // group child fetches: tag -> owning parent uids, in first-seen order
    let mut needed: Vec<(String, Vec<String>)> = Vec::new();
    for row in &rows {
        for &idx in &ref_columns {
            if let Value::Text(tag) = &row.values[idx] {
                match needed.iter_mut().find(|(t, _)| t == tag) {
                    Some((_, uids)) => uids.push(row.uid.clone()),
                    None => needed.push((tag.clone(), vec![row.uid.clone()])),
                }
            }
        }
    }

    // per tag: fetch, recurse, index by parent uid preserving rowid order
    let mut children: HashMap<String, HashMap<String, VecDeque<Box<dyn Any>>>> = HashMap::new();
    for (tag, parent_uids) in needed {
        let child_table = tables.get(&tag).ok_or_else(|| {
            Error::BadType(format!(
                "unknown type tag {} recorded in table {}",
                tag,
                table.name()
            ))
        })?;

        let child_rows = fetch_child_rows(tables, &tag, table.name(), &parent_uids)?;
        let owners: Vec<Option<String>> =
            child_rows.iter().map(|r| r.parent_uid.clone()).collect();
        let instances = (child_table.shape().assemble)(tables, codec, child_rows)?;

        let mut by_parent: HashMap<String, VecDeque<Box<dyn Any>>> = HashMap::new();
        for (instance, owner) in instances.into_iter().zip(owners) {
            if let Some(owner) = owner {
                by_parent.entry(owner).or_default().push_back(instance);
            }
        }
        children.insert(tag, by_parent);
    }

    let fields = T::fields();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if row.values.len() != fields.len() {
            return Err(Error::Assembly(format!(
                "row of {} holds {} cells for {} declared fields",
                T::type_name(),
                row.values.len(),
                fields.len()
            )));
        }

        let mut slots = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if !field.kind.is_reference() {
                slots.push(Slot::Cell(row.values[i].clone()));
                continue;
            }
            match &row.values[i] {
                Value::Null => slots.push(Slot::Child(None)),
                Value::Text(tag) => {
                    let instance = children
                        .get_mut(tag)
                        .and_then(|by_parent| by_parent.get_mut(&row.uid))
                        .and_then(|queue| queue.pop_front())
                        .ok_or_else(|| {
                            Error::Assembly(format!(
                                "missing child row of {} for parent {} in {}",
                                tag,
                                row.uid,
                                T::type_name()
                            ))
                        })?;
                    slots.push(Slot::Child(Some(AssembledChild::new(tag.clone(), instance))));
                }
                other => {
                    return Err(Error::Assembly(format!(
                        "reference column {} of {} holds a {} cell",
                        field.name,
                        T::type_name(),
                        other.kind_name()
                    )));
                }
            }
        }

        let mut instance = T::from_row(&mut RowReader::new(slots, codec))?;
        instance.post_assemble();
        out.push(instance);
    }
    Ok(out)
}

/// Erased entry point stored in [`TypeShape`](crate::model::TypeShape);
/// monomorphized per model when the shape is built.
pub(crate) fn assemble_erased<T: Model>(
    tables: &TableMap,
    codec: &dyn BlobCodec,
    rows: Vec<Row>,
) -> Result<Vec<Box<dyn Any>>> {
    Ok(assemble_many::<T>(tables, codec, rows)?
        .into_iter()
        .map(|instance| Box::new(instance) as Box<dyn Any>)
        .collect())
}

fn fetch_child_rows(
    tables: &TableMap,
    tag: &str,
    parent_table: &str,
    parent_uids: &[String],
) -> Result<Vec<Row>> {
    let child = &tables[tag];
    let conn = child.conn()?;
    let mut rows = Vec::new();
    for chunk in parent_uids.chunks(BIND_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE parent_table = ? AND parent_uid IN ({}) ORDER BY rowid",
            child.column_list(),
            child.name(),
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&parent_table];
        params.extend(chunk.iter().map(|uid| uid as &dyn rusqlite::ToSql));
        let fetched = stmt
            .query_map(&params[..], |sql_row| child.row_from_sql(sql_row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.extend(fetched);
    }
    Ok(rows)
}
