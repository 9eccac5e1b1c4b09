use std::{collections::BTreeMap, rc::Rc};

/// A node of the state tree.
///
/// Tables are reference counted, so updating a leaf only copies the tables along its path
/// while all unrelated subtrees stay shared between the old and new tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A scalar or array value, never a TOML table.
    Leaf(toml::Value),
    /// A table of named child values.
    Table(Rc<BTreeMap<String, Value>>),
}

/// Failure while replacing a value in the tree.
pub(crate) enum ReplaceError {
    /// The value at the given depth along the path is not a table.
    NotATable(usize),
}

impl Value {
    /// Creates an empty table.
    #[must_use]
    pub fn empty_table() -> Self {
        Self::Table(Rc::default())
    }

    /// Returns the child value at the given path segments.
    #[must_use]
    pub fn get_segments(&self, segments: &[&str]) -> Option<&Value> {
        segments
            .iter()
            .try_fold(self, |value, segment| match value {
                Value::Table(table) => table.get(*segment),
                Value::Leaf(_) => None,
            })
    }

    /// Converts the value back into a TOML value.
    #[must_use]
    pub fn to_toml(&self) -> toml::Value {
        match self {
            Value::Leaf(value) => value.clone(),
            Value::Table(table) => toml::Value::Table(
                table
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_toml()))
                    .collect(),
            ),
        }
    }

    /// Returns true if `self` and `other` are the same shared table.
    #[must_use]
    pub fn shares_table_with(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Returns a new tree with the value at the given path replaced.
    ///
    /// Missing tables along the path are created.
    pub(crate) fn replaced(&self, segments: &[&str], value: Value) -> Result<Value, ReplaceError> {
        self.replaced_at_depth(segments, value, 0)
    }

    fn replaced_at_depth(
        &self,
        segments: &[&str],
        value: Value,
        depth: usize,
    ) -> Result<Value, ReplaceError> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(value);
        };
        let Value::Table(table) = self else {
            return Err(ReplaceError::NotATable(depth));
        };

        let child = match table.get(*first) {
            Some(child) => child.replaced_at_depth(rest, value, depth + 1)?,
            None => Value::empty_table().replaced_at_depth(rest, value, depth + 1)?,
        };

        let mut table = BTreeMap::clone(table);
        table.insert((*first).to_owned(), child);

        Ok(Value::Table(Rc::new(table)))
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::Table(table) => Value::Table(Rc::new(
                table
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            )),
            value => Value::Leaf(value),
        }
    }
}
