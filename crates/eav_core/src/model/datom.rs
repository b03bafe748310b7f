//! Datom: one (entity, attribute, value) fact.

use crate::model::datatype::{DataType, Value};
use crate::model::entity::EntityId;
use serde::{Deserialize, Serialize};

/// Single current fact for one entity and attribute.
///
/// The datatype is derived from `value`, so it cannot disagree with the
/// populated slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datom {
    pub entity: EntityId,
    pub attribute: String,
    pub value: Value,
}

impl Datom {
    /// Creates a datom without schema validation.
    ///
    /// Prefer `Attribute::datom` when the owning definition is at hand.
    pub fn new(entity: impl Into<EntityId>, attribute: impl Into<String>, value: Value) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
            value,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }

    /// Column slots as persisted: `(stringval, numberval, booleanval, timeval)`.
    pub(crate) fn value_columns(
        &self,
    ) -> (
        Option<&str>,
        Option<f64>,
        Option<bool>,
        Option<chrono::DateTime<chrono::Utc>>,
    ) {
        match &self.value {
            Value::String(text) => (Some(text.as_str()), None, None, None),
            Value::Number(number) => (None, Some(*number), None, None),
            Value::Boolean(flag) => (None, None, Some(*flag), None),
            Value::Time(at) => (None, None, None, Some(*at)),
        }
    }
}
