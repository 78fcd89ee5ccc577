//! Flat predicate chain shared by select and delete.
//!
//! Predicates accumulate left to right; each call attaches with AND by
//! default, or with OR for the call following [`PredicateChain::or`]. The
//! chain never nests - it compiles to a single flat WHERE clause.

use crate::value::Value;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Connector {
    And,
    Or,
}

impl Connector {
    fn sql(self) -> &'static str {
        match self {
            Connector::And => " AND ",
            Connector::Or => " OR ",
        }
    }
}

#[derive(Debug)]
struct Predicate {
    column: String,
    operator: &'static str,
    value: Value,
    connector: Connector,
}

/// Accumulated predicates plus paging for one query.
#[derive(Debug, Default)]
pub(crate) struct PredicateChain {
    predicates: Vec<Predicate>,
    pending_or: bool,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl PredicateChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the next predicate call with OR instead of AND
    pub fn or(&mut self) {
        self.pending_or = true;
    }

    fn take_connector(&mut self) -> Connector {
        if std::mem::take(&mut self.pending_or) {
            Connector::Or
        } else {
            Connector::And
        }
    }

    fn push_all<I, C, V>(&mut self, pairs: I, operator: &'static str, guard: fn(&Value) -> Result<()>)
    -> Result<()>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        let connector = self.take_connector();
        for (column, value) in pairs {
            let value = value.into();
            guard(&value)?;
            self.predicates.push(Predicate {
                column: column.into(),
                operator,
                value,
                connector,
            });
        }
        Ok(())
    }

    fn guard_scalar(value: &Value) -> Result<()> {
        if value.is_scalar() {
            Ok(())
        } else {
            Err(Error::BadType(format!(
                "values must be numeric, text, boolean or null for equality checks, got {}",
                value.kind_name()
            )))
        }
    }

    fn guard_numeric(value: &Value) -> Result<()> {
        if value.is_numeric() {
            Ok(())
        } else {
            Err(Error::BadType(format!(
                "values must be numeric for ordering comparisons, got {}",
                value.kind_name()
            )))
        }
    }

    fn guard_text(value: &Value) -> Result<()> {
        if value.is_text() {
            Ok(())
        } else {
            Err(Error::BadType(format!(
                "values must be text for like checks, got {}",
                value.kind_name()
            )))
        }
    }

    pub fn eq<I, C, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        // null compiles to IS at render time
        self.push_all(pairs, "=", Self::guard_scalar)
    }

    pub fn ne<I, C, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.push_all(pairs, "!=", Self::guard_scalar)
    }

    pub fn lt<I, C, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.push_all(pairs, "<", Self::guard_numeric)
    }

    pub fn gt<I, C, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.push_all(pairs, ">", Self::guard_numeric)
    }

    pub fn le<I, C, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.push_all(pairs, "<=", Self::guard_numeric)
    }

    pub fn ge<I, C, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.push_all(pairs, ">=", Self::guard_numeric)
    }

    pub fn like<I, C, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.push_all(pairs, "LIKE", Self::guard_text)
    }

    pub fn not_like<I, C, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.push_all(pairs, "NOT LIKE", Self::guard_text)
    }

    pub fn set_limit(&mut self, limit: u64, offset: Option<u64>) -> Result<()> {
        if limit == 0 {
            return Err(Error::Query("limit must be greater than zero".into()));
        }
        self.limit = Some(limit);
        self.offset = offset;
        Ok(())
    }

    pub fn override_limit(&mut self, limit: u64) {
        if self.limit.is_some() {
            self.limit = Some(limit);
            self.offset = None;
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Render the WHERE clause (without paging). Returns the SQL fragment
    /// (leading space included, empty when no predicates) and the bound
    /// parameters.
    pub fn where_clause(&self) -> (String, Vec<Value>) {
        if self.predicates.is_empty() {
            return (String::new(), Vec::new());
        }

        let mut sql = String::from(" WHERE ");
        let mut params = Vec::new();
        for (i, pred) in self.predicates.iter().enumerate() {
            if i > 0 {
                sql.push_str(pred.connector.sql());
            }
            if pred.value.is_null() {
                let is_op = match pred.operator {
                    "=" => "IS NULL",
                    "!=" => "IS NOT NULL",
                    other => other,
                };
                sql.push_str(&format!("{} {}", pred.column, is_op));
            } else {
                sql.push_str(&format!("{} {} ?", pred.column, pred.operator));
                params.push(pred.value.clone());
            }
        }
        (sql, params)
    }

    /// Render WHERE plus LIMIT/OFFSET
    pub fn compile(&self) -> (String, Vec<Value>) {
        let (mut sql, params) = self.where_clause();
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = self.offset {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }
        (sql, params)
    }
}
