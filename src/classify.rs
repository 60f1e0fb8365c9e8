//! Classification of native objects into GPI object types.
//!
//! Backends translate their own kind and type codes into [`NativeKind`] and
//! [`TypeDesc`]; [`classify`] is the single, pure mapping from those to a
//! [`Classification`]. Stored values (signals, nets) and transient values
//! (variables) go through the same table because both show up as children
//! during hierarchy traversal.

use serde::{Deserialize, Serialize};

use crate::types::{IndexRange, ObjectType, ValueFormat};

/// Native object kind, as reported by a backend's kind introspection.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeKind {
    Module,
    Package,
    /// A native generate-array object (only some backends expose one).
    GenerateArray,
    /// One elaborated element of a generate loop.
    GenerateScope,
    /// Verilog-style net.
    Net,
    /// Verilog-style variable of register kind.
    Reg,
    /// Stored value (VHDL signal).
    Signal,
    /// Transient value (variable).
    Variable,
    /// Parameter, generic or constant.
    Constant,
    Other,
}

impl NativeKind {
    /// Returns true for constant objects.
    #[must_use]
    pub const fn is_const(self) -> bool {
        matches!(self, Self::Constant)
    }
}

/// Native type descriptor, as reported by a backend's type introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeDesc {
    /// Enumerated type with its literals in position order.
    Enumeration {
        /// Literal names. Character literals may keep their quotes.
        literals: Vec<String>,
    },
    /// Integer scalar.
    Integer,
    /// Floating-point scalar.
    Floating,
    /// Native string type.
    Str,
    /// Record or struct.
    Record {
        /// Packed records carry a bit-vector value.
        #[serde(default)]
        packed: bool,
    },
    /// Array or vector of `element`.
    Array {
        /// Element type.
        element: Box<TypeDesc>,
        /// Declared index range.
        range: IndexRange,
    },
    /// Objects that have no type (scopes).
    None,
}

impl TypeDesc {
    /// Convenience constructor for an array type.
    #[must_use]
    pub fn array(element: TypeDesc, range: IndexRange) -> Self {
        Self::Array {
            element: Box::new(element),
            range,
        }
    }

    /// The nine-state standard logic enumeration.
    #[must_use]
    pub fn std_logic() -> Self {
        Self::Enumeration {
            literals: ["U", "X", "0", "1", "Z", "W", "L", "H", "-"]
                .iter()
                .map(|s| format!("'{s}'"))
                .collect(),
        }
    }

    /// The two-state bit enumeration.
    #[must_use]
    pub fn bit() -> Self {
        Self::Enumeration {
            literals: vec!["'0'".to_string(), "'1'".to_string()],
        }
    }

    /// The two-valued boolean enumeration.
    #[must_use]
    pub fn boolean() -> Self {
        Self::Enumeration {
            literals: vec!["false".to_string(), "true".to_string()],
        }
    }

    /// The 256-valued character enumeration.
    #[must_use]
    pub fn character() -> Self {
        Self::Enumeration {
            literals: (0u8..=255).map(|c| format!("'{}'", char::from(c))).collect(),
        }
    }
}

/// Result of classifying a native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Object classification tag.
    pub object_type: ObjectType,
    /// Value encoding.
    pub format: ValueFormat,
    /// Whether the object is constant.
    pub is_const: bool,
    /// Element count (1 for scalars, 0 for scopes).
    pub num_elems: usize,
    /// Declared range for indexable objects.
    pub range: Option<IndexRange>,
}

/// Scalar category of an enumeration or scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Logic,
    Bool,
    Char,
    Enum,
    Int,
    Real,
    Str,
    Record { packed: bool },
}

const NINE_STATE: [&str; 9] = ["U", "X", "0", "1", "Z", "W", "L", "H", "-"];

fn strip_quotes(literal: &str) -> &str {
    literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(literal)
}

fn enumeration_scalar(literals: &[String]) -> Scalar {
    let bare: Vec<&str> = literals.iter().map(|l| strip_quotes(l)).collect();
    if bare == ["0", "1"] || bare == NINE_STATE {
        Scalar::Logic
    } else if bare.len() == 2
        && bare[0].eq_ignore_ascii_case("false")
        && bare[1].eq_ignore_ascii_case("true")
    {
        Scalar::Bool
    } else if bare.len() == 256 {
        Scalar::Char
    } else {
        Scalar::Enum
    }
}

fn scalar_of(ty: &TypeDesc) -> Option<Scalar> {
    match ty {
        TypeDesc::Enumeration { literals } => Some(enumeration_scalar(literals)),
        TypeDesc::Integer => Some(Scalar::Int),
        TypeDesc::Floating => Some(Scalar::Real),
        TypeDesc::Str => Some(Scalar::Str),
        TypeDesc::Record { packed } => Some(Scalar::Record { packed: *packed }),
        TypeDesc::Array { .. } | TypeDesc::None => None,
    }
}

fn scalar_classification(kind: NativeKind, scalar: Scalar) -> (ObjectType, ValueFormat) {
    match scalar {
        Scalar::Logic => match kind {
            NativeKind::Net => (ObjectType::Net, ValueFormat::Logic),
            NativeKind::Reg => (ObjectType::Register, ValueFormat::Logic),
            _ => (ObjectType::Logic, ValueFormat::Logic),
        },
        Scalar::Bool => (ObjectType::Integer, ValueFormat::Bool),
        Scalar::Char => (ObjectType::Integer, ValueFormat::Char),
        Scalar::Enum => (ObjectType::Enum, ValueFormat::Enum),
        Scalar::Int => (ObjectType::Integer, ValueFormat::Int),
        Scalar::Real => (ObjectType::Real, ValueFormat::Real),
        Scalar::Str => (ObjectType::String, ValueFormat::Str),
        Scalar::Record { packed: true } => (ObjectType::PackedStructure, ValueFormat::Logic),
        Scalar::Record { packed: false } => (ObjectType::Structure, ValueFormat::None),
    }
}

/// Maps a native kind and type to a classification.
///
/// Pure: identical inputs always give identical outputs.
#[must_use]
pub fn classify(kind: NativeKind, ty: &TypeDesc) -> Classification {
    let is_const = kind.is_const();
    let scope = |object_type| Classification {
        object_type,
        format: ValueFormat::None,
        is_const,
        num_elems: 0,
        range: None,
    };

    match kind {
        NativeKind::Module | NativeKind::GenerateScope => return scope(ObjectType::Module),
        NativeKind::Package => return scope(ObjectType::Package),
        NativeKind::GenerateArray => return scope(ObjectType::GenArray),
        NativeKind::Other => return scope(ObjectType::Unknown),
        NativeKind::Net
        | NativeKind::Reg
        | NativeKind::Signal
        | NativeKind::Variable
        | NativeKind::Constant => {}
    }

    match ty {
        TypeDesc::Array { element, range } => {
            let (object_type, format) = match scalar_of(element) {
                Some(Scalar::Logic) => match kind {
                    NativeKind::Net => (ObjectType::Net, ValueFormat::Logic),
                    NativeKind::Reg => (ObjectType::Register, ValueFormat::Logic),
                    _ => (ObjectType::LogicArray, ValueFormat::Logic),
                },
                Some(Scalar::Char) => (ObjectType::String, ValueFormat::Str),
                _ => (ObjectType::Array, ValueFormat::None),
            };
            Classification {
                object_type,
                format,
                is_const,
                num_elems: range.len(),
                range: Some(*range),
            }
        }
        TypeDesc::None => scope(ObjectType::Unknown),
        scalar => {
            let Some(scalar) = scalar_of(scalar) else {
                return scope(ObjectType::Unknown);
            };
            let (object_type, format) = scalar_classification(kind, scalar);
            Classification {
                object_type,
                format,
                is_const,
                num_elems: usize::from(format != ValueFormat::None),
                range: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RangeDirection;

    fn vector(width: i64) -> TypeDesc {
        TypeDesc::array(
            TypeDesc::std_logic(),
            IndexRange::new(width - 1, 0, RangeDirection::Descending),
        )
    }

    #[test]
    fn test_logic_scalars() {
        let c = classify(NativeKind::Signal, &TypeDesc::std_logic());
        assert_eq!(c.object_type, ObjectType::Logic);
        assert_eq!(c.format, ValueFormat::Logic);
        assert_eq!(c.num_elems, 1);

        let c = classify(NativeKind::Signal, &TypeDesc::bit());
        assert_eq!(c.object_type, ObjectType::Logic);
    }

    #[test]
    fn test_signal_and_variable_classify_identically() {
        for ty in [
            TypeDesc::std_logic(),
            TypeDesc::boolean(),
            TypeDesc::character(),
            TypeDesc::Integer,
            TypeDesc::Floating,
            vector(8),
            TypeDesc::Record { packed: false },
        ] {
            assert_eq!(
                classify(NativeKind::Signal, &ty),
                classify(NativeKind::Variable, &ty),
                "diverged for {ty:?}"
            );
        }
    }

    #[test]
    fn test_special_enumerations() {
        let c = classify(NativeKind::Signal, &TypeDesc::boolean());
        assert_eq!((c.object_type, c.format), (ObjectType::Integer, ValueFormat::Bool));

        let c = classify(NativeKind::Signal, &TypeDesc::character());
        assert_eq!((c.object_type, c.format), (ObjectType::Integer, ValueFormat::Char));

        let states = TypeDesc::Enumeration {
            literals: vec!["IDLE".into(), "RUN".into(), "DONE".into()],
        };
        let c = classify(NativeKind::Signal, &states);
        assert_eq!((c.object_type, c.format), (ObjectType::Enum, ValueFormat::Enum));
    }

    #[test]
    fn test_arrays_classify_by_element() {
        let c = classify(NativeKind::Signal, &vector(4));
        assert_eq!(c.object_type, ObjectType::LogicArray);
        assert_eq!(c.num_elems, 4);
        assert_eq!(c.range, Some(IndexRange::new(3, 0, RangeDirection::Descending)));

        let c = classify(NativeKind::Net, &vector(4));
        assert_eq!(c.object_type, ObjectType::Net);

        let string = TypeDesc::array(
            TypeDesc::character(),
            IndexRange::new(1, 5, RangeDirection::Ascending),
        );
        let c = classify(NativeKind::Constant, &string);
        assert_eq!(c.object_type, ObjectType::String);
        assert!(c.is_const);

        let of_enum = TypeDesc::array(
            TypeDesc::Enumeration {
                literals: vec!["A".into(), "B".into(), "C".into()],
            },
            IndexRange::new(0, 3, RangeDirection::Ascending),
        );
        let of_record = TypeDesc::array(
            TypeDesc::Record { packed: false },
            IndexRange::new(0, 1, RangeDirection::Ascending),
        );
        assert_eq!(classify(NativeKind::Signal, &of_enum).object_type, ObjectType::Array);
        assert_eq!(classify(NativeKind::Signal, &of_record).object_type, ObjectType::Array);
    }

    #[test]
    fn test_classify_is_pure() {
        let ty = TypeDesc::array(
            TypeDesc::array(TypeDesc::Floating, IndexRange::from_bounds(0, 2)),
            IndexRange::from_bounds(3, 0),
        );
        let first = classify(NativeKind::Variable, &ty);
        for _ in 0..4 {
            assert_eq!(classify(NativeKind::Variable, &ty.clone()), first);
        }
        assert_eq!(first.object_type, ObjectType::Array);
    }

    #[test]
    fn test_scopes() {
        assert_eq!(
            classify(NativeKind::Module, &TypeDesc::None).object_type,
            ObjectType::Module
        );
        assert_eq!(
            classify(NativeKind::GenerateScope, &TypeDesc::None).object_type,
            ObjectType::Module
        );
        assert_eq!(
            classify(NativeKind::GenerateArray, &TypeDesc::None).object_type,
            ObjectType::GenArray
        );
        assert_eq!(
            classify(NativeKind::Package, &TypeDesc::None).object_type,
            ObjectType::Package
        );
    }

    #[test]
    fn test_packed_record_carries_logic_value() {
        let c = classify(NativeKind::Variable, &TypeDesc::Record { packed: true });
        assert_eq!(c.object_type, ObjectType::PackedStructure);
        assert_eq!(c.format, ValueFormat::Logic);
    }
}
