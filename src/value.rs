//! Typed value accessors.
//!
//! Each handle's classification decides which encodings it can be read or
//! written in. Calling an inapplicable accessor is a typed error, never a
//! crash, and has no side effects.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GpiError, GpiResult};
use crate::handle::ObjHandle;
use crate::logic::decode_binstr;
use crate::types::{ObjectType, ValueFormat};

/// A value in one of the externally exposed encodings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SignalValue {
    /// Bit-vector string over the nine-state alphabet, leftmost index first.
    BinStr(String),
    /// Raw byte string.
    Str(Vec<u8>),
    /// Real number.
    Real(f64),
    /// Integer.
    Long(i64),
}

impl SignalValue {
    /// The accessor needed to read or write this encoding.
    #[must_use]
    pub const fn accessor(&self) -> Accessor {
        match self {
            Self::BinStr(_) => Accessor::BinStr,
            Self::Str(_) => Accessor::Str,
            Self::Real(_) => Accessor::Real,
            Self::Long(_) => Accessor::Long,
        }
    }

    /// Convenience constructor for a bit-vector string.
    #[must_use]
    pub fn binstr(s: impl Into<String>) -> Self {
        Self::BinStr(s.into())
    }
}

/// The four value encodings.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessor {
    BinStr,
    Str,
    Real,
    Long,
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

impl Accessor {
    const fn operation(self) -> &'static str {
        match self {
            Self::BinStr => "binstr access",
            Self::Str => "string access",
            Self::Real => "real access",
            Self::Long => "integer access",
        }
    }
}

/// Returns true if objects of this classification support `accessor`.
#[must_use]
pub fn supports(object_type: ObjectType, format: ValueFormat, accessor: Accessor) -> bool {
    let integral = matches!(
        format,
        ValueFormat::Int | ValueFormat::Bool | ValueFormat::Char | ValueFormat::Enum
    );
    match accessor {
        Accessor::BinStr => object_type.is_logic() || integral,
        Accessor::Str => object_type == ObjectType::String,
        Accessor::Real => object_type == ObjectType::Real,
        Accessor::Long => object_type.is_logic() || integral,
    }
}

pub(crate) fn check_read(handle: &ObjHandle, accessor: Accessor) -> GpiResult<()> {
    if supports(handle.object_type(), handle.format(), accessor) {
        Ok(())
    } else {
        Err(GpiError::Unsupported {
            operation: accessor.operation(),
            object_type: handle.object_type(),
        })
    }
}

pub(crate) fn check_write(handle: &ObjHandle, value: &SignalValue) -> GpiResult<()> {
    if handle.is_const() {
        return Err(GpiError::ReadOnly {
            name: handle.fullname().to_string(),
        });
    }
    check_read(handle, value.accessor())?;

    if let SignalValue::BinStr(bits) = value {
        decode_binstr(bits)?;
        if handle.format() == ValueFormat::Logic
            && handle.num_elems() > 0
            && bits.len() != handle.num_elems()
        {
            return Err(GpiError::invalid_value(format!(
                "'{bits}' has {} bits but {} has {}",
                bits.len(),
                handle.fullname(),
                handle.num_elems()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendKind, NativeRef};
    use crate::classify::{classify, NativeKind, TypeDesc};
    use crate::types::{IndexRange, RangeDirection};

    fn handle(kind: NativeKind, ty: &TypeDesc) -> ObjHandle {
        ObjHandle::new(NativeRef::from_raw(1), "s", "top.s", classify(kind, ty), BackendKind::Model)
    }

    #[test]
    fn test_accessor_matrix() {
        assert!(supports(ObjectType::LogicArray, ValueFormat::Logic, Accessor::BinStr));
        assert!(supports(ObjectType::LogicArray, ValueFormat::Logic, Accessor::Long));
        assert!(!supports(ObjectType::LogicArray, ValueFormat::Logic, Accessor::Real));
        assert!(supports(ObjectType::Real, ValueFormat::Real, Accessor::Real));
        assert!(!supports(ObjectType::Real, ValueFormat::Real, Accessor::Long));
        assert!(supports(ObjectType::String, ValueFormat::Str, Accessor::Str));
        assert!(supports(ObjectType::Integer, ValueFormat::Bool, Accessor::Long));
        assert!(!supports(ObjectType::Module, ValueFormat::None, Accessor::BinStr));
        assert!(!supports(ObjectType::Structure, ValueFormat::None, Accessor::Long));
    }

    #[test]
    fn test_unsupported_read_names_the_type() {
        let h = handle(NativeKind::Module, &TypeDesc::None);
        let err = check_read(&h, Accessor::Real).unwrap_err();
        assert!(matches!(
            err,
            GpiError::Unsupported { object_type: ObjectType::Module, .. }
        ));
    }

    #[test]
    fn test_write_validation() {
        let vector = TypeDesc::array(
            TypeDesc::std_logic(),
            IndexRange::new(3, 0, RangeDirection::Descending),
        );
        let h = handle(NativeKind::Signal, &vector);
        assert!(check_write(&h, &SignalValue::binstr("10XZ")).is_ok());
        assert!(check_write(&h, &SignalValue::binstr("101")).is_err());
        assert!(check_write(&h, &SignalValue::binstr("10Q1")).is_err());
        assert!(check_write(&h, &SignalValue::Real(1.0)).is_err());

        let param = handle(NativeKind::Constant, &TypeDesc::Integer);
        assert!(matches!(
            check_write(&param, &SignalValue::Long(3)),
            Err(GpiError::ReadOnly { .. })
        ));
    }
}
