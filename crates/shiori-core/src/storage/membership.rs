//! Set-membership predicates for id and username lists
//!
//! Statements that take "these ids, or everything when none are given" are
//! written once with a fixed shape:
//!
//! ```sql
//! WHERE (:all OR id IN rarray(:set))
//! ```
//!
//! and bound from a [`Membership`]. The `rarray` table-valued function is
//! registered on every pooled connection, so the list is passed as a single
//! parameter instead of being spliced into the SQL.

use std::rc::Rc;

use rusqlite::types::Value;
use rusqlite::vtab::array::Array;

/// Which rows a statement applies to
#[derive(Debug, Clone)]
pub enum Membership {
    /// Every row
    All,
    /// Only rows whose key is in the set
    AnyOf(Array),
}

impl Membership {
    /// Rows whose integer key is one of `ids`; an empty slice means every row
    pub fn ids(ids: &[i64]) -> Self {
        if ids.is_empty() {
            Membership::All
        } else {
            Membership::AnyOf(Rc::new(ids.iter().copied().map(Value::from).collect()))
        }
    }

    /// Rows whose text key is one of `values`; an empty slice means every row
    pub fn texts<S: AsRef<str>>(values: &[S]) -> Self {
        if values.is_empty() {
            Membership::All
        } else {
            Membership::AnyOf(Rc::new(
                values
                    .iter()
                    .map(|v| Value::from(v.as_ref().to_string()))
                    .collect(),
            ))
        }
    }

    /// Value bound to `:all`
    pub fn all_flag(&self) -> bool {
        matches!(self, Membership::All)
    }

    /// Value bound to `:set`
    pub fn set(&self) -> Array {
        match self {
            Membership::All => Rc::new(Vec::new()),
            Membership::AnyOf(values) => Rc::clone(values),
        }
    }
}
