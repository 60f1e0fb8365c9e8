//! Handles: this layer's identity for one simulation object.
//!
//! A handle is built once per resolved path and never reclassified. The native
//! reference it wraps is a back-reference owned by the simulator; dropping a
//! handle only drops this layer's bookkeeping.

use std::fmt;
use std::rc::Rc;

use crate::backend::{BackendKind, NativeRef};
use crate::classify::Classification;
use crate::types::{IndexRange, ObjectType, RangeDirection, ValueFormat};

/// Shared handle returned to callers. Releasing it is dropping it.
pub type Handle = Rc<ObjHandle>;

/// One simulation object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjHandle {
    native: NativeRef,
    name: String,
    fullname: String,
    class: Classification,
    backend: BackendKind,
    pseudo: bool,
}

impl ObjHandle {
    /// Builds a handle for a real native object.
    #[must_use]
    pub fn new(
        native: NativeRef,
        name: impl Into<String>,
        fullname: impl Into<String>,
        class: Classification,
        backend: BackendKind,
    ) -> Self {
        Self {
            native,
            name: name.into(),
            fullname: fullname.into(),
            class,
            backend,
            pseudo: false,
        }
    }

    /// Builds a generate-loop pseudo-region.
    ///
    /// Its native reference is the *parent's*; only indexed lookups through it
    /// reach real objects.
    #[must_use]
    pub fn pseudo_region(
        parent: &ObjHandle,
        name: impl Into<String>,
        range: Option<IndexRange>,
    ) -> Self {
        let name = name.into();
        let fullname = join_path(&parent.fullname, &name);
        Self {
            native: parent.native,
            name,
            fullname,
            class: Classification {
                object_type: ObjectType::GenArray,
                format: ValueFormat::None,
                is_const: false,
                num_elems: range.map_or(0, |r| r.len()),
                range,
            },
            backend: parent.backend,
            pseudo: true,
        }
    }

    /// Wrapped native reference (non-owning).
    #[must_use]
    pub const fn native(&self) -> NativeRef {
        self.native
    }

    /// Short name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified hierarchical name.
    #[must_use]
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Classification tag.
    #[must_use]
    pub const fn object_type(&self) -> ObjectType {
        self.class.object_type
    }

    /// Value encoding.
    #[must_use]
    pub const fn format(&self) -> ValueFormat {
        self.class.format
    }

    /// Whether the object is constant.
    #[must_use]
    pub const fn is_const(&self) -> bool {
        self.class.is_const
    }

    /// Element count.
    #[must_use]
    pub const fn num_elems(&self) -> usize {
        self.class.num_elems
    }

    /// Declared range, for indexable objects.
    #[must_use]
    pub const fn range(&self) -> Option<IndexRange> {
        self.class.range
    }

    /// Declared range direction, for indexable objects.
    #[must_use]
    pub fn direction(&self) -> Option<RangeDirection> {
        self.class.range.map(|r| r.direction)
    }

    /// Backend that built this handle.
    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Returns true for synthesized generate-loop pseudo-regions.
    #[must_use]
    pub const fn is_pseudo(&self) -> bool {
        self.pseudo
    }
}

impl fmt::Display for ObjHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.fullname, self.class.object_type)
    }
}

/// Joins a parent path and a child name with the hierarchy separator.
#[must_use]
pub fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}.{child}")
    }
}

/// Appends an index selection to a path: `parent[index]`.
#[must_use]
pub fn index_path(parent: &str, index: i64) -> String {
    format!("{parent}[{index}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify, NativeKind, TypeDesc};

    #[test]
    fn test_pseudo_region_shares_parent_native() {
        let parent = ObjHandle::new(
            NativeRef::from_raw(42),
            "top",
            "top",
            classify(NativeKind::Module, &TypeDesc::None),
            BackendKind::Model,
        );
        let range = IndexRange::new(0, 3, RangeDirection::Ascending);
        let genarray = ObjHandle::pseudo_region(&parent, "loop", Some(range));

        assert_eq!(genarray.native(), parent.native());
        assert_eq!(genarray.object_type(), ObjectType::GenArray);
        assert_eq!(genarray.fullname(), "top.loop");
        assert_eq!(genarray.num_elems(), 4);
        assert!(genarray.is_pseudo());
        assert!(!parent.is_pseudo());
    }

    #[test]
    fn test_paths() {
        assert_eq!(join_path("", "top"), "top");
        assert_eq!(join_path("top.u0", "clk"), "top.u0.clk");
        assert_eq!(index_path("top.loop", 2), "top.loop[2]");
    }
}
