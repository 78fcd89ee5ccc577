//! Delete builder - predicate-driven removal with cascading descendants.
//!
//! Deleting from a table is only legal when it is a parent table; dependency
//! tables lose rows exclusively through their owners. After the matching rows
//! go, every dynamic type tag they recorded is resolved against the registry
//! and the owned rows in the corresponding child tables are removed the same
//! way, transitively.

use std::marker::PhantomData;

use crate::model::Model;
use crate::query::predicate::PredicateChain;
use crate::schema::registry::Registry;
use crate::schema::table::{BIND_CHUNK, TableDefinition, TableMap};
use crate::value::Value;
use crate::{Error, Result};

/// Typed delete over one registered parent table.
pub struct Delete<'a, T: Model> {
    registry: &'a Registry,
    chain: PredicateChain,
    _marker: PhantomData<T>,
}

impl<'a, T: Model> Delete<'a, T> {
    /// Build a delete for `T`. Errors if the type is not registered.
    pub fn new(registry: &'a Registry) -> Result<Self> {
        if !registry.is_known_type::<T>() {
            return Err(Error::UnknownType(T::type_name().to_string()));
        }
        Ok(Self {
            registry,
            chain: PredicateChain::new(),
            _marker: PhantomData,
        })
    }

    /// Attach the next predicate call with OR instead of AND
    pub fn or(mut self) -> Self {
        self.chain.or();
        self
    }

    pub fn eq<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.eq(pairs)?;
        Ok(self)
    }

    pub fn ne<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.ne(pairs)?;
        Ok(self)
    }

    pub fn lt<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.lt(pairs)?;
        Ok(self)
    }

    pub fn gt<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.gt(pairs)?;
        Ok(self)
    }

    pub fn le<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.le(pairs)?;
        Ok(self)
    }

    pub fn ge<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.ge(pairs)?;
        Ok(self)
    }

    pub fn like<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.like(pairs)?;
        Ok(self)
    }

    pub fn not_like<I, C, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.chain.not_like(pairs)?;
        Ok(self)
    }

    /// Delete matching rows plus their descendants. Returns the count of
    /// directly deleted rows, or the total including every cascaded
    /// descendant when `full_count` is set.
    pub fn commit(self, full_count: bool) -> Result<u64> {
        let tables = self.registry.tables_snapshot();
        let table = tables
            .get(T::type_name())
            .ok_or_else(|| Error::UnknownType(T::type_name().to_string()))?;
        if !table.is_parent() {
            return Err(Error::Parent(format!(
                "cannot delete from dependency table {}",
                table.name()
            )));
        }

        let (where_sql, params) = self.chain.where_clause();
        let clause = (!where_sql.is_empty()).then_some((where_sql.as_str(), params.as_slice()));
        let (direct, cascaded) = delete_and_cascade(&tables, table, clause)?;
        tracing::debug!(table = table.name(), direct, cascaded, "deleted rows");
        Ok(if full_count { direct + cascaded } else { direct })
    }
}

/// A deleted row's identity plus the type tags its reference columns held
struct DoomedRow {
    uid: String,
    tags: Vec<Option<String>>,
}

/// Delete rows of `table` matching `clause` (all rows when `None`), then
/// cascade into descendants. Returns (direct, cascaded descendant) counts.
pub(crate) fn delete_and_cascade(
    tables: &TableMap,
    table: &TableDefinition,
    clause: Option<(&str, &[Value])>,
) -> Result<(u64, u64)> {
    let (where_sql, params) = match clause {
        Some((sql, params)) => (sql.to_string(), params.to_vec()),
        None => (String::new(), Vec::new()),
    };

    let doomed = collect_doomed(table, &where_sql, &params)?;
    if doomed.is_empty() {
        return Ok((0, 0));
    }

    let uids: Vec<String> = doomed.iter().map(|row| row.uid.clone()).collect();
    delete_by_uids(table, &uids)?;
    let cascaded = cascade(tables, table, doomed)?;
    Ok((uids.len() as u64, cascaded))
}

/// Partial cleanup during type removal: delete only the rows of `table` owned
/// by `owner_table`, cascading into their descendants.
pub(crate) fn delete_owned_by(
    tables: &TableMap,
    table: &TableDefinition,
    owner_table: &str,
) -> Result<(u64, u64)> {
    let params = [Value::Text(owner_table.to_string())];
    delete_and_cascade(tables, table, Some((" WHERE parent_table = ?", &params)))
}

fn collect_doomed(
    table: &TableDefinition,
    where_sql: &str,
    params: &[Value],
) -> Result<Vec<DoomedRow>> {
    let ref_columns = table.reference_columns();
    let mut cols = vec!["uid"];
    cols.extend(ref_columns.iter().map(|&i| table.fields()[i].name));

    let sql = format!(
        "SELECT {} FROM \"{}\"{}",
        cols.join(", "),
        table.name(),
        where_sql
    );
    let conn = table.conn()?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let uid: String = row.get(0)?;
            let mut tags = Vec::with_capacity(ref_columns.len());
            for i in 0..ref_columns.len() {
                tags.push(row.get::<_, Option<String>>(1 + i)?);
            }
            Ok(DoomedRow { uid, tags })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn delete_by_uids(table: &TableDefinition, uids: &[String]) -> Result<()> {
    let conn = table.conn()?;
    for chunk in uids.chunks(BIND_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        conn.execute(
            &format!(
                "DELETE FROM \"{}\" WHERE uid IN ({})",
                table.name(),
                placeholders
            ),
            rusqlite::params_from_iter(chunk.iter()),
        )?;
    }
    Ok(())
}

/// Resolve the tags recorded by deleted rows and remove the owned rows in
/// each child table, recursively. Returns the descendant count.
fn cascade(tables: &TableMap, table: &TableDefinition, doomed: Vec<DoomedRow>) -> Result<u64> {
    // group owner uids per tag across the whole deleted set
    let mut by_tag: Vec<(String, Vec<String>)> = Vec::new();
    for row in doomed {
        for tag in row.tags.into_iter().flatten() {
            match by_tag.iter_mut().find(|(t, _)| *t == tag) {
                Some((_, uids)) => uids.push(row.uid.clone()),
                None => by_tag.push((tag, vec![row.uid.clone()])),
            }
        }
    }

    let mut total = 0;
    for (tag, parent_uids) in by_tag {
        let child = tables.get(&tag).ok_or_else(|| {
            Error::BadType(format!(
                "unknown type tag {} recorded in table {}",
                tag,
                table.name()
            ))
        })?;

        let mut doomed_children = Vec::new();
        for chunk in parent_uids.chunks(BIND_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let where_sql = format!(
                " WHERE parent_table = ? AND parent_uid IN ({})",
                placeholders
            );
            let mut params = vec![Value::Text(table.name().to_string())];
            params.extend(chunk.iter().map(|uid| Value::Text(uid.clone())));
            doomed_children.extend(collect_doomed(child, &where_sql, &params)?);
        }

        if doomed_children.is_empty() {
            continue;
        }
        let uids: Vec<String> = doomed_children.iter().map(|row| row.uid.clone()).collect();
        delete_by_uids(child, &uids)?;
        total += uids.len() as u64;
        total += cascade(tables, child, doomed_children)?;
    }
    Ok(total)
}
