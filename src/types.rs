//! Core vocabulary shared by every layer: classifications, ranges, edges,
//! write actions and callback reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GpiError, GpiResult};

/// Classification tag of a simulation object.
///
/// Assigned once when a handle is built and never changed afterwards.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ObjectType {
    Unknown = 0,
    Module = 1,
    Net = 2,
    Register = 3,
    Logic = 4,
    LogicArray = 5,
    Integer = 6,
    Real = 7,
    Enum = 8,
    String = 9,
    Structure = 10,
    PackedStructure = 11,
    Array = 12,
    /// Synthetic handle for an unindexed generate loop.
    GenArray = 13,
    Package = 14,
}

impl ObjectType {
    /// Objects that carry a value and can be read or written.
    #[must_use]
    pub const fn is_value(self) -> bool {
        matches!(
            self,
            Self::Net
                | Self::Register
                | Self::Logic
                | Self::LogicArray
                | Self::Integer
                | Self::Real
                | Self::Enum
                | Self::String
                | Self::PackedStructure
        )
    }

    /// Objects whose value is a vector of nine-state logic.
    #[must_use]
    pub const fn is_logic(self) -> bool {
        matches!(
            self,
            Self::Net | Self::Register | Self::Logic | Self::LogicArray | Self::PackedStructure
        )
    }

    /// Objects that are region-like (hold other objects, never a value).
    #[must_use]
    pub const fn is_scope(self) -> bool {
        matches!(self, Self::Module | Self::GenArray | Self::Package)
    }

    /// Objects whose elements are addressed by a logical index.
    #[must_use]
    pub const fn is_indexable(self) -> bool {
        matches!(
            self,
            Self::Array | Self::LogicArray | Self::Net | Self::Register | Self::GenArray
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Module => "MODULE",
            Self::Net => "NET",
            Self::Register => "REGISTER",
            Self::Logic => "LOGIC",
            Self::LogicArray => "LOGIC_ARRAY",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Enum => "ENUM",
            Self::String => "STRING",
            Self::Structure => "STRUCTURE",
            Self::PackedStructure => "PACKED_STRUCTURE",
            Self::Array => "ARRAY",
            Self::GenArray => "GENARRAY",
            Self::Package => "PACKAGE",
        };
        f.write_str(name)
    }
}

/// How a value-carrying object's native value is represented.
///
/// Refines an [`ObjectType`]; for instance booleans and characters are both
/// classified `Integer` but decode differently.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    /// Nine-state (or two-state) logic, scalar or vector.
    Logic,
    Bool,
    Char,
    Int,
    Real,
    /// Enumeration literal, exposed by position.
    Enum,
    Str,
    /// No value (scopes, records, arrays).
    None,
}

/// Language world an object belongs to.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Verilog,
    Vhdl,
}

/// Declared direction of an index range.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeDirection {
    Ascending,
    Descending,
}

/// Declared index range of an indexable object.
///
/// Translates logical indices in the declared numbering (which may run either
/// way and need not start at zero) to zero-based storage offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexRange {
    /// Left (first declared) bound.
    pub left: i64,
    /// Right (last declared) bound.
    pub right: i64,
    /// Counting direction from left to right.
    pub direction: RangeDirection,
}

impl IndexRange {
    /// Creates a range with an explicit direction.
    #[must_use]
    pub const fn new(left: i64, right: i64, direction: RangeDirection) -> Self {
        Self {
            left,
            right,
            direction,
        }
    }

    /// Creates a range, inferring the direction from the bounds.
    ///
    /// Equal bounds are treated as descending, matching `[n:n]` declarations.
    #[must_use]
    pub const fn from_bounds(left: i64, right: i64) -> Self {
        let direction = if left < right {
            RangeDirection::Ascending
        } else {
            RangeDirection::Descending
        };
        Self::new(left, right, direction)
    }

    /// Number of elements covered. Null ranges (bounds against the direction) are empty.
    ///
    /// Saturates at `usize::MAX`.
    #[must_use]
    pub fn len(&self) -> usize {
        let null = match self.direction {
            RangeDirection::Descending => self.left < self.right,
            RangeDirection::Ascending => self.left > self.right,
        };
        if null {
            return 0;
        }
        usize::try_from(self.left.abs_diff(self.right))
            .ok()
            .and_then(|span| span.checked_add(1))
            .unwrap_or(usize::MAX)
    }

    /// Returns true if the range covers no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Translates a logical index to a zero-based storage offset.
    ///
    /// # Errors
    /// `IndexOutOfRange` if the index is not inside the declared range.
    pub fn offset(&self, index: i64) -> GpiResult<usize> {
        let offset = match self.direction {
            RangeDirection::Descending => self.left.checked_sub(index),
            RangeDirection::Ascending => index.checked_sub(self.left),
        };
        match offset.map(usize::try_from) {
            Some(Ok(offset)) if offset < self.len() => Ok(offset),
            _ => Err(GpiError::IndexOutOfRange {
                index,
                left: self.left,
                right: self.right,
            }),
        }
    }

    /// Translates a zero-based storage offset back to the logical index.
    #[must_use]
    pub fn index(&self, offset: usize) -> Option<i64> {
        if offset >= self.len() {
            return None;
        }
        let offset = i64::try_from(offset).ok()?;
        match self.direction {
            RangeDirection::Descending => self.left.checked_sub(offset),
            RangeDirection::Ascending => self.left.checked_add(offset),
        }
    }

    /// Iterates logical indices from left to right.
    pub fn indices(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len()).filter_map(|off| self.index(off))
    }
}

/// Edge filter applied to value-change callbacks.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum Edge {
    Rising = 1,
    Falling = 2,
    Any = 3,
}

impl Edge {
    /// Tests a freshly read bit-vector string against the filter.
    #[must_use]
    pub fn accepts(self, binstr: &str) -> bool {
        match self {
            Self::Rising => binstr == "1",
            Self::Falling => binstr == "0",
            Self::Any => true,
        }
    }
}

impl TryFrom<i32> for Edge {
    type Error = GpiError;

    fn try_from(raw: i32) -> GpiResult<Self> {
        match raw {
            1 => Ok(Self::Rising),
            2 => Ok(Self::Falling),
            3 => Ok(Self::Any),
            other => Err(GpiError::invalid_value(format!("unknown edge code {other}"))),
        }
    }
}

/// Value-assignment semantics for driving a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum SetAction {
    /// One-shot assignment applied in the current write phase.
    Deposit = 0,
    /// Persistent override until released.
    Force = 1,
    /// Removes a force.
    Release = 2,
    /// Immediate assignment.
    NoDelay = 3,
}

impl TryFrom<i32> for SetAction {
    type Error = GpiError;

    fn try_from(raw: i32) -> GpiResult<Self> {
        match raw {
            0 => Ok(Self::Deposit),
            1 => Ok(Self::Force),
            2 => Ok(Self::Release),
            3 => Ok(Self::NoDelay),
            other => Err(GpiError::invalid_value(format!("unknown set action {other}"))),
        }
    }
}

/// Trigger category of a callback.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackReason {
    AfterDelay,
    ValueChange,
    ReadOnly,
    ReadWrite,
    NextTimeStep,
    StartOfSimulation,
    EndOfSimulation,
}

impl CallbackReason {
    /// Reasons whose native registration is consumed by a single firing.
    #[must_use]
    pub const fn is_one_shot(self) -> bool {
        !matches!(self, Self::ValueChange)
    }

    /// Reasons tied to a scheduler phase boundary.
    #[must_use]
    pub const fn is_phase(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite | Self::NextTimeStep)
    }
}

impl fmt::Display for CallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AfterDelay => "after-delay",
            Self::ValueChange => "value-change",
            Self::ReadOnly => "read-only",
            Self::ReadWrite => "read-write",
            Self::NextTimeStep => "next-time-step",
            Self::StartOfSimulation => "start-of-simulation",
            Self::EndOfSimulation => "end-of-simulation",
        };
        f.write_str(name)
    }
}

/// Splits a 64-bit simulation time into `(high, low)` 32-bit words.
#[must_use]
pub const fn split_time(time: u64) -> (u32, u32) {
    #[allow(clippy::cast_possible_truncation)]
    ((time >> 32) as u32, time as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descending_range_offsets() {
        let range = IndexRange::new(3, 0, RangeDirection::Descending);
        assert_eq!(range.len(), 4);
        assert_eq!(range.offset(3).unwrap(), 0);
        assert_eq!(range.offset(0).unwrap(), 3);
        assert!(range.offset(4).is_err());
        assert!(range.offset(-1).is_err());
    }

    #[test]
    fn test_ascending_range_not_starting_at_zero() {
        let range = IndexRange::new(-2, 5, RangeDirection::Ascending);
        assert_eq!(range.len(), 8);
        assert_eq!(range.offset(-2).unwrap(), 0);
        assert_eq!(range.offset(5).unwrap(), 7);
        assert!(matches!(
            range.offset(6),
            Err(GpiError::IndexOutOfRange { index: 6, left: -2, right: 5 })
        ));
    }

    #[test]
    fn test_offset_index_roundtrip_is_identity() {
        for range in [
            IndexRange::new(7, 0, RangeDirection::Descending),
            IndexRange::new(0, 7, RangeDirection::Ascending),
            IndexRange::new(10, 3, RangeDirection::Descending),
            IndexRange::new(-4, -1, RangeDirection::Ascending),
            IndexRange::new(5, 5, RangeDirection::Descending),
        ] {
            let mut seen = vec![false; range.len()];
            for index in range.indices() {
                let offset = range.offset(index).unwrap();
                assert!(!seen[offset], "offset {offset} hit twice in {range:?}");
                seen[offset] = true;
                assert_eq!(range.index(offset), Some(index));
            }
            assert!(seen.iter().all(|s| *s));
        }
    }

    #[test]
    fn test_null_range_is_empty() {
        let range = IndexRange::new(0, -1, RangeDirection::Ascending);
        assert!(range.is_empty());
        assert!(range.offset(0).is_err());
    }

    #[test]
    fn test_extreme_indices_are_out_of_range() {
        for range in [
            IndexRange::new(3, 0, RangeDirection::Descending),
            IndexRange::new(0, 3, RangeDirection::Ascending),
            IndexRange::new(-5, i64::MAX, RangeDirection::Ascending),
        ] {
            assert!(range.offset(i64::MIN).is_err(), "{range:?}");
        }
        let descending = IndexRange::new(i64::MAX, 0, RangeDirection::Descending);
        assert!(descending.offset(i64::MIN).is_err());
        assert_eq!(descending.offset(i64::MAX).unwrap(), 0);

        let full = IndexRange::new(i64::MIN, i64::MAX, RangeDirection::Ascending);
        assert_eq!(full.len(), usize::MAX);
        assert_eq!(full.index(0), Some(i64::MIN));
        assert_eq!(IndexRange::new(i64::MAX, 0, RangeDirection::Ascending).len(), 0);
    }

    #[test]
    fn test_edge_filter() {
        assert!(Edge::Rising.accepts("1"));
        assert!(!Edge::Rising.accepts("X"));
        assert!(!Edge::Rising.accepts("0"));
        assert!(Edge::Falling.accepts("0"));
        assert!(!Edge::Falling.accepts("Z"));
        assert!(Edge::Any.accepts("U"));
    }

    #[test]
    fn test_split_time() {
        assert_eq!(split_time(0x0000_0002_0000_0005), (2, 5));
        assert_eq!(split_time(u64::from(u32::MAX)), (0, u32::MAX));
    }
}
