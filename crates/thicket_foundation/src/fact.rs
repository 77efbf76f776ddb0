//! Facts, fact templates, and field extraction.
//!
//! A [`Fact`] is a typed record: an object type keyword plus a map of field
//! values. Templates describe the fields a type is expected to carry and are
//! used to validate facts before they enter working memory.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::collections::LtMap;
use crate::error::{Error, ErrorKind};
use crate::intern::{Interner, KeywordId};
use crate::types::Type;
use crate::value::Value;
use crate::Result;

/// A fact value: an object type plus named fields.
///
/// Cloning is O(1); fields live in a persistent map.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fact {
    object_type: KeywordId,
    fields: LtMap<KeywordId, Value>,
}

impl Fact {
    /// Creates a fact of the given type with no fields.
    #[must_use]
    pub fn new(object_type: KeywordId) -> Self {
        Self {
            object_type,
            fields: LtMap::new(),
        }
    }

    /// Builder method to set a field.
    #[must_use]
    pub fn with(mut self, field: KeywordId, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets a field value in place.
    pub fn set(&mut self, field: KeywordId, value: impl Into<Value>) {
        self.fields = self.fields.insert(field, value.into());
    }

    /// Returns the object type of this fact.
    #[must_use]
    pub const fn object_type(&self) -> KeywordId {
        self.object_type
    }

    /// Returns a field value, if present.
    #[must_use]
    pub fn get(&self, field: KeywordId) -> Option<&Value> {
        self.fields.get(&field)
    }

    /// Returns a field value, treating a missing field as nil.
    #[must_use]
    pub fn get_or_nil(&self, field: KeywordId) -> Value {
        self.fields.get(&field).cloned().unwrap_or(Value::Nil)
    }

    /// Iterates over all fields.
    pub fn fields(&self) -> impl Iterator<Item = (&KeywordId, &Value)> {
        self.fields.iter()
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fact({:?} ", self.object_type)?;
        f.debug_map().entries(self.fields.iter()).finish()?;
        write!(f, ")")
    }
}

// =============================================================================
// Templates
// =============================================================================

/// A single field declaration in a template.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldTemplate {
    /// Field name.
    pub name: KeywordId,
    /// Declared type of the field.
    pub field_type: Type,
}

impl FieldTemplate {
    /// Creates a field declaration.
    #[must_use]
    pub fn new(name: KeywordId, field_type: Type) -> Self {
        Self { name, field_type }
    }
}

/// A named schema for facts of one object type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactTemplate {
    /// The object type this template describes.
    pub name: KeywordId,
    /// Declared fields, in declaration order.
    pub fields: Vec<FieldTemplate>,
}

impl FactTemplate {
    /// Creates an empty template.
    #[must_use]
    pub fn new(name: KeywordId) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    /// Builder method to declare a field.
    #[must_use]
    pub fn with_field(mut self, name: KeywordId, field_type: Type) -> Self {
        self.fields.push(FieldTemplate::new(name, field_type));
        self
    }

    /// Looks up a field declaration.
    #[must_use]
    pub fn field(&self, name: KeywordId) -> Option<&FieldTemplate> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Creates a fact of this template's type with every field set to nil.
    #[must_use]
    pub fn create_fact(&self) -> Fact {
        let mut fact = Fact::new(self.name);
        for field in &self.fields {
            fact.set(field.name, Value::Nil);
        }
        fact
    }

    /// Validates a fact against this template.
    ///
    /// Every field present on the fact must be declared, and its value must be
    /// accepted by the declared type. Nil is always accepted so that freshly
    /// created facts validate before their fields are filled in.
    ///
    /// # Errors
    /// Returns `UnknownField` or `TypeMismatch` on the first offending field.
    pub fn validate(&self, fact: &Fact, interner: &Interner) -> Result<()> {
        for (name, value) in fact.fields() {
            let Some(decl) = self.field(*name) else {
                return Err(Error::new(ErrorKind::UnknownField {
                    template: interner.get_keyword(self.name).unwrap_or("?").to_string(),
                    field: interner.get_keyword(*name).unwrap_or("?").to_string(),
                }));
            };
            if value.is_nil() {
                continue;
            }
            let actual = value.value_type();
            if !decl.field_type.accepts(&actual) {
                return Err(Error::type_mismatch(decl.field_type.clone(), actual));
            }
        }
        Ok(())
    }
}

/// Reads one field out of facts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldExtractor {
    /// The field to read.
    pub field: KeywordId,
}

impl FieldExtractor {
    /// Creates an extractor for a field.
    #[must_use]
    pub const fn new(field: KeywordId) -> Self {
        Self { field }
    }

    /// Returns the field value, nil if the fact lacks the field.
    #[must_use]
    pub fn value(&self, fact: &Fact) -> Value {
        fact.get_or_nil(self.field)
    }

    /// Returns true if the field is missing or nil.
    #[must_use]
    pub fn is_null(&self, fact: &Fact) -> bool {
        fact.get(self.field).is_none_or(Value::is_nil)
    }
}
