//! Named per-element attribute tables
//!
//! Each [`AttributeTable`] maps slot indices to values of one scalar type.
//! Tables are sparse: only slots that were assigned a value are stored.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttributeError {
    #[error("attribute '{table}' holds {expected} values, got {actual}")]
    TypeMismatch {
        table: String,
        expected: AttributeType,
        actual: AttributeType,
    },

    #[error("attribute '{0}' already exists")]
    Duplicate(String),

    #[error("no attribute named '{0}'")]
    Unknown(String),
}

impl From<AttributeError> for crate::GraphError {
    fn from(e: AttributeError) -> Self {
        crate::GraphError::Other(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Text,
    Integer,
    Float,
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttributeType::Text => "text",
            AttributeType::Integer => "integer",
            AttributeType::Float => "float",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl AttributeValue {
    #[must_use]
    pub fn ty(&self) -> AttributeType {
        match self {
            AttributeValue::Text(_) => AttributeType::Text,
            AttributeValue::Integer(_) => AttributeType::Integer,
            AttributeValue::Float(_) => AttributeType::Float,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Integer(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

#[derive(Debug, Clone)]
enum Values {
    Text(HashMap<usize, String>),
    Integer(HashMap<usize, i64>),
    Float(HashMap<usize, f64>),
}

impl Values {
    fn ty(&self) -> AttributeType {
        match self {
            Values::Text(_) => AttributeType::Text,
            Values::Integer(_) => AttributeType::Integer,
            Values::Float(_) => AttributeType::Float,
        }
    }
}

/// Sparse slot -> value mapping of one type
#[derive(Debug, Clone)]
pub struct AttributeTable {
    name: String,
    values: Values,
}

impl AttributeTable {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        let values = match ty {
            AttributeType::Text => Values::Text(HashMap::new()),
            AttributeType::Integer => Values::Integer(HashMap::new()),
            AttributeType::Float => Values::Float(HashMap::new()),
        };
        Self {
            name: name.into(),
            values,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> AttributeType {
        self.values.ty()
    }

    /// Assign `value` to `slot`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::TypeMismatch`] if `value` is not of the
    /// table's type.
    pub fn set(&mut self, slot: usize, value: impl Into<AttributeValue>) -> Result<(), AttributeError> {
        match (&mut self.values, value.into()) {
            (Values::Text(map), AttributeValue::Text(v)) => {
                map.insert(slot, v);
            }
            (Values::Integer(map), AttributeValue::Integer(v)) => {
                map.insert(slot, v);
            }
            (Values::Float(map), AttributeValue::Float(v)) => {
                map.insert(slot, v);
            }
            (values, other) => {
                return Err(AttributeError::TypeMismatch {
                    table: self.name.clone(),
                    expected: values.ty(),
                    actual: other.ty(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<AttributeValue> {
        match &self.values {
            Values::Text(map) => map.get(&slot).cloned().map(AttributeValue::Text),
            Values::Integer(map) => map.get(&slot).copied().map(AttributeValue::Integer),
            Values::Float(map) => map.get(&slot).copied().map(AttributeValue::Float),
        }
    }

    /// Returns the removed value, if `slot` had one
    pub fn remove(&mut self, slot: usize) -> Option<AttributeValue> {
        match &mut self.values {
            Values::Text(map) => map.remove(&slot).map(AttributeValue::Text),
            Values::Integer(map) => map.remove(&slot).map(AttributeValue::Integer),
            Values::Float(map) => map.remove(&slot).map(AttributeValue::Float),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.values {
            Values::Text(map) => map.len(),
            Values::Integer(map) => map.len(),
            Values::Float(map) => map.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assigned slots and their values, sorted by slot
    pub fn iter(&self) -> impl Iterator<Item = (usize, AttributeValue)> {
        let mut entries: Vec<(usize, AttributeValue)> = match &self.values {
            Values::Text(map) => map.iter().map(|(&k, v)| (k, AttributeValue::Text(v.clone()))).collect(),
            Values::Integer(map) => map.iter().map(|(&k, &v)| (k, AttributeValue::Integer(v))).collect(),
            Values::Float(map) => map.iter().map(|(&k, &v)| (k, AttributeValue::Float(v))).collect(),
        };
        entries.sort_by_key(|(slot, _)| *slot);
        entries.into_iter()
    }
}

/// Attribute tables of one element kind, addressed by name
#[derive(Debug, Clone, Default)]
pub struct AttributeSet {
    tables: Vec<AttributeTable>,
    by_name: HashMap<String, usize>,
}

impl AttributeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::Duplicate`] if a table with this name exists.
    pub fn create(&mut self, name: &str, ty: AttributeType) -> Result<&mut AttributeTable, AttributeError> {
        if self.by_name.contains_key(name) {
            log::warn!("attributes.create: '{name}' already exists");
            return Err(AttributeError::Duplicate(name.to_string()));
        }
        let index = self.tables.len();
        self.by_name.insert(name.to_string(), index);
        self.tables.push(AttributeTable::new(name, ty));
        log::debug!("attributes.create: '{name}' ({ty})");
        Ok(&mut self.tables[index])
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&AttributeTable> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    /// # Errors
    ///
    /// Returns [`AttributeError::Unknown`] if there is no such table.
    pub fn table_mut(&mut self, name: &str) -> Result<&mut AttributeTable, AttributeError> {
        match self.by_name.get(name) {
            Some(&i) => Ok(&mut self.tables[i]),
            None => Err(AttributeError::Unknown(name.to_string())),
        }
    }

    /// Forget every value assigned to `slot`
    pub fn clear_slot(&mut self, slot: usize) {
        for table in &mut self.tables {
            table.remove(slot);
        }
    }

    /// Table names in creation order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(AttributeTable::name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
