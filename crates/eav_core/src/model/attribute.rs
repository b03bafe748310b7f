//! Attribute descriptor.
//!
//! # Invariants
//! - `(store_id, name)` is unique; `data_type` never changes for a defined
//!   attribute.

use crate::model::datatype::{CoercionError, DataType, RawValue};
use crate::model::datom::Datom;
use crate::model::entity::EntityId;
use serde::{Deserialize, Serialize};

/// Numeric namespace partitioning schema and data.
pub type StoreId = u32;

/// Store-scoped, typed attribute definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub store_id: StoreId,
    pub name: String,
    pub data_type: DataType,
}

impl Attribute {
    pub fn new(store_id: StoreId, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            store_id,
            name: name.into(),
            data_type,
        }
    }

    /// Builds a datom for `entity` after coercing `raw` against this attribute.
    ///
    /// # Errors
    /// - Returns `CoercionError` when `raw` does not fit `data_type`.
    pub fn datom(
        &self,
        entity: impl Into<EntityId>,
        raw: impl Into<RawValue>,
    ) -> Result<Datom, CoercionError> {
        let value = self.data_type.coerce(raw.into())?;
        Ok(Datom::new(entity, self.name.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::Attribute;
    use crate::model::datatype::{DataType, Value};
    use crate::model::entity::EntityId;

    #[test]
    fn datom_carries_coerced_value_and_attribute_type() {
        let attr = Attribute::new(1, "count", DataType::Number);
        let datom = attr.datom("e1", 359).unwrap();

        assert_eq!(datom.entity, EntityId::Text("e1".to_string()));
        assert_eq!(datom.attribute, "count");
        assert_eq!(datom.value, Value::Number(359.0));
        assert_eq!(datom.data_type(), attr.data_type);
    }

    #[test]
    fn datom_rejects_mismatched_input() {
        let attr = Attribute::new(1, "flag", DataType::Boolean);
        let err = attr.datom(7, "yes").unwrap_err();
        assert_eq!(err.expected, DataType::Boolean);
        assert_eq!(err.offered, "text");
    }
}
