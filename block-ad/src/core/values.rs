//! Variable keys and the typed values store
//!
//! A [`Values`] maps each [`Key`] to one [`Value`], a closed sum type over the manifold types
//! expressions can read. Typed access goes through [`ValueType`], so a leaf declared as a
//! pose fails with [`CoreError::TypeMismatch`] when the store holds a point under that key.

use crate::{
    core::{CoreError, CoreResult},
    error::BlockAdResult,
    manifold::{
        Manifold, ManifoldResult, Point2, Point3, cal3_s2::Cal3S2, se3::SE3, so3::SO3,
    },
};
use nalgebra::DVector;
use std::{
    collections::HashMap,
    fmt,
    fmt::{Display, Formatter},
};

/// Identifier of one unknown.
pub type Key = u64;

const CHR_BITS: u32 = 8;
const INDEX_BITS: u32 = Key::BITS - CHR_BITS;
const INDEX_MASK: Key = (1 << INDEX_BITS) - 1;

/// Largest index a [`Symbol`] can encode.
pub const MAX_SYMBOL_INDEX: u64 = INDEX_MASK;

/// Human-readable key: a character in the top 8 bits and an index in the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    chr: u8,
    index: u64,
}

impl Symbol {
    /// # Panics
    /// If `index` exceeds [`MAX_SYMBOL_INDEX`]; see [`Symbol::try_new`].
    pub fn new(chr: u8, index: u64) -> Self {
        assert!(
            index <= MAX_SYMBOL_INDEX,
            "symbol index {index} exceeds {MAX_SYMBOL_INDEX}"
        );
        Symbol { chr, index }
    }

    /// Fails with `InvalidInput` when `index` does not fit below the character bits.
    pub fn try_new(chr: u8, index: u64) -> CoreResult<Self> {
        if index > MAX_SYMBOL_INDEX {
            return Err(CoreError::InvalidInput(format!(
                "symbol index {index} exceeds {MAX_SYMBOL_INDEX}"
            ))
            .log());
        }
        Ok(Symbol { chr, index })
    }

    pub fn chr(&self) -> u8 {
        self.chr
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn key(&self) -> Key {
        ((self.chr as Key) << INDEX_BITS) | self.index
    }

    /// Decode a key; plain integer keys have `chr == 0`.
    pub fn from_key(key: Key) -> Self {
        Symbol {
            chr: (key >> INDEX_BITS) as u8,
            index: key & INDEX_MASK,
        }
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.chr.is_ascii_graphic() {
            write!(f, "{}{}", self.chr as char, self.index)
        } else {
            write!(f, "{}", self.key())
        }
    }
}

impl From<Symbol> for Key {
    fn from(symbol: Symbol) -> Key {
        symbol.key()
    }
}

/// Shorthand for `Symbol::new(chr, index).key()`.
///
/// # Panics
/// If `index` exceeds [`MAX_SYMBOL_INDEX`].
pub fn symbol(chr: u8, index: u64) -> Key {
    Symbol::new(chr, index).key()
}

/// Render a key as `x1` when it was built from a symbol, or as the bare integer otherwise.
pub fn format_key(key: &Key) -> String {
    Symbol::from_key(*key).to_string()
}

/// A stored variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Rot3(SO3),
    Pose3(SE3),
    Point2(Point2),
    Point3(Point3),
    Cal3S2(Cal3S2),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Rot3(_) => SO3::TYPE_NAME,
            Value::Pose3(_) => SE3::TYPE_NAME,
            Value::Point2(_) => Point2::TYPE_NAME,
            Value::Point3(_) => Point3::TYPE_NAME,
            Value::Cal3S2(_) => Cal3S2::TYPE_NAME,
        }
    }

    /// Tangent space dimension of the stored value
    pub fn dim(&self) -> usize {
        match self {
            Value::Rot3(v) => v.tangent_dim(),
            Value::Pose3(v) => v.tangent_dim(),
            Value::Point2(v) => v.tangent_dim(),
            Value::Point3(v) => v.tangent_dim(),
            Value::Cal3S2(v) => v.tangent_dim(),
        }
    }

    /// Apply a tangent space step: x_new = x ⊞ δx.
    ///
    /// Fails with `InvalidTangentDimension` when `delta` does not match [`Value::dim`].
    pub fn retract(&self, delta: &DVector<f64>) -> ManifoldResult<Value> {
        Ok(match self {
            Value::Rot3(v) => Value::Rot3(v.try_retract(delta)?),
            Value::Pose3(v) => Value::Pose3(v.try_retract(delta)?),
            Value::Point2(v) => Value::Point2(v.try_retract(delta)?),
            Value::Point3(v) => Value::Point3(v.try_retract(delta)?),
            Value::Cal3S2(v) => Value::Cal3S2(v.try_retract(delta)?),
        })
    }
}

/// Maps a manifold type to its [`Value`] variant.
pub trait ValueType: Manifold {
    const TYPE_NAME: &'static str;

    fn from_value(value: &Value) -> Option<&Self>;

    fn into_value(self) -> Value;
}

macro_rules! impl_value_type {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl ValueType for $ty {
            const TYPE_NAME: &'static str = $name;

            fn from_value(value: &Value) -> Option<&Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

impl_value_type!(SO3, Rot3, "Rot3");
impl_value_type!(SE3, Pose3, "Pose3");
impl_value_type!(Point2, Point2, "Point2");
impl_value_type!(Point3, Point3, "Point3");
impl_value_type!(Cal3S2, Cal3S2, "Cal3_S2");

/// Variable assignment read by expressions and factors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    values: HashMap<Key, Value>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new variable. Fails if the key is already present.
    pub fn insert<T: ValueType>(&mut self, key: impl Into<Key>, value: T) -> CoreResult<()> {
        self.insert_value(key.into(), value.into_value())
    }

    pub fn insert_value(&mut self, key: Key, value: Value) -> CoreResult<()> {
        if self.values.contains_key(&key) {
            return Err(CoreError::DuplicateVariable { key }.log());
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Replace an existing variable. Fails if the key is absent or the type differs.
    pub fn update<T: ValueType>(&mut self, key: impl Into<Key>, value: T) -> CoreResult<()> {
        let key = key.into();
        self.at::<T>(key)?;
        self.values.insert(key, value.into_value());
        Ok(())
    }

    /// Replace an existing variable with any value. Fails if the key is absent.
    pub fn update_value(&mut self, key: Key, value: Value) -> CoreResult<()> {
        match self.values.get_mut(&key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CoreError::MissingVariable { key }.log()),
        }
    }

    /// Typed lookup.
    pub fn at<T: ValueType>(&self, key: impl Into<Key>) -> CoreResult<&T> {
        let key = key.into();
        let value = self.get(key)?;
        T::from_value(value).ok_or_else(|| {
            CoreError::TypeMismatch {
                key,
                expected: T::TYPE_NAME,
                actual: value.type_name(),
            }
            .log()
        })
    }

    /// Untyped lookup.
    pub fn get(&self, key: Key) -> CoreResult<&Value> {
        self.values
            .get(&key)
            .ok_or_else(|| CoreError::MissingVariable { key }.log())
    }

    pub fn exists(&self, key: Key) -> bool {
        self.values.contains_key(&key)
    }

    /// Sorted keys of all stored variables.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.values.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total tangent dimension of all stored variables.
    pub fn dim(&self) -> usize {
        self.values.values().map(Value::dim).sum()
    }

    /// Retract one variable in place.
    pub fn retract_key(&mut self, key: Key, delta: &DVector<f64>) -> BlockAdResult<()> {
        let updated = self.get(key)?.retract(delta)?;
        self.values.insert(key, updated);
        Ok(())
    }

    /// Return a copy with every key in `delta` retracted; keys not in `delta` are unchanged.
    pub fn retract(&self, delta: &HashMap<Key, DVector<f64>>) -> BlockAdResult<Values> {
        let mut result = self.clone();
        for (&key, step) in delta {
            result.retract_key(key, step)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::BlockAdError, manifold::ManifoldError};
    use nalgebra::dvector;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_symbol_roundtrip_and_display() {
        let key = symbol(b'x', 42);
        let decoded = Symbol::from_key(key);
        assert_eq!(decoded, Symbol::new(b'x', 42));
        assert_eq!(format_key(&key), "x42");
        assert_eq!(format_key(&5), "5");
    }

    #[test]
    fn test_symbol_index_range() -> TestResult {
        let last = Symbol::try_new(b'x', MAX_SYMBOL_INDEX)?;
        assert_eq!(Symbol::from_key(last.key()), last);
        assert_ne!(last.key(), symbol(b'x', 0));
        assert_ne!(last.key(), symbol(b'y', 0));

        assert!(matches!(
            Symbol::try_new(b'x', MAX_SYMBOL_INDEX + 1),
            Err(CoreError::InvalidInput(_))
        ));
        let overflow = std::panic::catch_unwind(|| symbol(b'x', 1 << 56));
        assert!(overflow.is_err());
        Ok(())
    }

    #[test]
    fn test_insert_and_typed_lookup() -> TestResult {
        let mut values = Values::new();
        values.insert(1u64, SE3::identity())?;
        values.insert(symbol(b'l', 0), Point3::new(0.0, 0.0, 1.0))?;
        values.insert(3u64, Cal3S2::default())?;

        assert_eq!(values.len(), 3);
        assert_eq!(values.dim(), 6 + 3 + 5);
        assert_eq!(*values.at::<Point3>(symbol(b'l', 0))?, Point3::new(0.0, 0.0, 1.0));
        assert_eq!(values.at::<Cal3S2>(3u64)?.fx, 1.0);
        Ok(())
    }

    #[test]
    fn test_duplicate_insert_fails() -> TestResult {
        let mut values = Values::new();
        values.insert(1u64, Point2::new(1.0, 2.0))?;
        let result = values.insert(1u64, Point2::new(3.0, 4.0));
        assert_eq!(result, Err(CoreError::DuplicateVariable { key: 1 }));
        Ok(())
    }

    #[test]
    fn test_missing_and_mismatched_lookup() -> TestResult {
        let mut values = Values::new();
        values.insert(1u64, Point3::zeros())?;

        assert_eq!(
            values.at::<Point3>(2u64).err(),
            Some(CoreError::MissingVariable { key: 2 })
        );
        assert_eq!(
            values.at::<SE3>(1u64).err(),
            Some(CoreError::TypeMismatch {
                key: 1,
                expected: "Pose3",
                actual: "Point3",
            })
        );
        Ok(())
    }

    #[test]
    fn test_update_requires_existing_key_and_type() -> TestResult {
        let mut values = Values::new();
        values.insert(1u64, Point3::zeros())?;
        values.update(1u64, Point3::new(1.0, 1.0, 1.0))?;
        assert_eq!(*values.at::<Point3>(1u64)?, Point3::new(1.0, 1.0, 1.0));

        assert!(values.update(2u64, Point3::zeros()).is_err());
        assert!(values.update(1u64, Point2::zeros()).is_err());
        values.update_value(1, Value::Point2(Point2::zeros()))?;
        assert_eq!(values.get(1)?.type_name(), "Point2");
        Ok(())
    }

    #[test]
    fn test_retract() -> TestResult {
        let mut values = Values::new();
        values.insert(1u64, Point3::new(1.0, 2.0, 3.0))?;
        values.insert(2u64, SE3::identity())?;

        let mut delta = HashMap::new();
        delta.insert(1, dvector![0.5, 0.0, -1.0]);
        let retracted = values.retract(&delta)?;
        assert_eq!(*retracted.at::<Point3>(1u64)?, Point3::new(1.5, 2.0, 2.0));
        assert_eq!(retracted.at::<SE3>(2u64)?, values.at::<SE3>(2u64)?);

        let mut bad = HashMap::new();
        bad.insert(2, dvector![1.0, 2.0]);
        assert!(matches!(
            values.retract(&bad),
            Err(BlockAdError::Manifold(ManifoldError::InvalidTangentDimension {
                expected: 6,
                actual: 2
            }))
        ));

        let mut short = values.clone();
        assert!(short.retract_key(1, &dvector![1.0]).is_err());
        assert_eq!(short, values);
        assert!(matches!(
            short.retract_key(9, &dvector![1.0, 2.0, 3.0]),
            Err(BlockAdError::Core(CoreError::MissingVariable { key: 9 }))
        ));
        Ok(())
    }
}
