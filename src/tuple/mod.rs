use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::common::ShapeHash;
use crate::error::SpaceError;

use self::value::Value;

pub mod template;
pub mod value;

/// An immutable, non-empty record of named values.
///
/// Two tuples are equal iff their field mappings are equal. The shape hash
/// depends only on the key set and never changes after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    fields: HashMap<String, Value>,
    shape: ShapeHash,
}

impl Tuple {
    pub fn new(fields: HashMap<String, Value>) -> Result<Self, SpaceError> {
        if fields.is_empty() {
            return Err(SpaceError::InvalidTuple("empty field map".to_owned()));
        }
        if fields.keys().any(|key| key.is_empty()) {
            return Err(SpaceError::InvalidTuple("empty field name".to_owned()));
        }
        let shape = shape_of(fields.keys().map(String::as_str));
        Ok(Self { fields, shape })
    }

    pub fn shape(&self) -> ShapeHash {
        self.shape
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn into_fields(self) -> HashMap<String, Value> {
        self.fields
    }
}

/// Commutative combine over the key hashes. Identical key sets yield the
/// same shape regardless of iteration order, for tuples and templates alike.
pub(crate) fn shape_of<'a>(keys: impl Iterator<Item = &'a str>) -> ShapeHash {
    keys.map(|key| {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    })
    .fold(0u64, u64::wrapping_add)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::value::Value;
    use super::{shape_of, Tuple};
    use crate::error::SpaceError;

    fn tuple(pairs: &[(&str, Value)]) -> Tuple {
        let fields: HashMap<String, Value> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        Tuple::new(fields).unwrap()
    }

    #[test]
    fn shape_ignores_key_order_and_values() {
        let left = shape_of(["name", "age"].into_iter());
        let right = shape_of(["age", "name"].into_iter());
        assert_eq!(left, right);

        let a = tuple(&[("name", Value::Str("v".to_owned())), ("age", Value::I64(22))]);
        let b = tuple(&[("age", Value::I64(99)), ("name", Value::Str("w".to_owned()))]);
        assert_eq!(a.shape(), b.shape());
    }

    #[test]
    fn different_key_sets_differ() {
        let a = tuple(&[("x", Value::I64(1))]);
        let b = tuple(&[("y", Value::I64(1))]);
        assert_ne!(a.shape(), b.shape());
    }

    #[test]
    fn rejects_empty_tuples() {
        assert_eq!(
            Tuple::new(HashMap::new()).unwrap_err(),
            SpaceError::InvalidTuple("empty field map".to_owned())
        );

        let mut fields = HashMap::new();
        fields.insert(String::new(), Value::I64(1));
        assert_eq!(
            Tuple::new(fields).unwrap_err(),
            SpaceError::InvalidTuple("empty field name".to_owned())
        );
    }

    #[test]
    fn equality_is_field_equality() {
        let a = tuple(&[("k", Value::I64(1))]);
        let b = tuple(&[("k", Value::I64(1))]);
        let c = tuple(&[("k", Value::I64(2))]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
