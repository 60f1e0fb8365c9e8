//! Name- and index-based resolution of hierarchy children.
//!
//! Generate loops are normalized here and nowhere else: looking up the
//! unindexed loop name always yields a GENARRAY pseudo-region whose native
//! reference is the parent's, whatever the backend does natively, and only
//! indexed lookups (`loop[n]`) reach real objects.

use std::sync::OnceLock;

use log::{debug, trace};
use regex::Regex;

use crate::backend::{Backend, NativeInfo, NativeRef};
use crate::classify::{classify, NativeKind};
use crate::handle::{index_path, join_path, ObjHandle};
use crate::iterator::Relation;
use crate::types::{IndexRange, ObjectType, RangeDirection};

static INDEXED_NAME: OnceLock<Regex> = OnceLock::new();

fn indexed_name() -> &'static Regex {
    INDEXED_NAME.get_or_init(|| {
        Regex::new(r"^(?P<base>.+?)(?:\[(?P<bracket>-?\d+)\]|\((?P<paren>-?\d+)\))$")
            .unwrap_or_else(|e| panic!("invalid indexed-name pattern: {e}"))
    })
}

/// Splits `loop[3]` (or VHDL-style `loop(3)`) into `("loop", 3)`.
#[must_use]
pub fn parse_indexed(name: &str) -> Option<(&str, i64)> {
    let caps = indexed_name().captures(name)?;
    let base = caps.name("base")?.as_str();
    let index = caps
        .name("bracket")
        .or_else(|| caps.name("paren"))?
        .as_str()
        .parse()
        .ok()?;
    Some((base, index))
}

/// Builds a handle from an already-described native object.
pub(crate) fn make_handle(
    backend: &dyn Backend,
    native: NativeRef,
    info: &NativeInfo,
    name: impl Into<String>,
    fullname: impl Into<String>,
) -> ObjHandle {
    let mut class = classify(info.kind, &info.ty);
    if class.object_type == ObjectType::PackedStructure {
        if let Some(size) = info.size {
            class.num_elems = size;
        }
    }
    ObjHandle::new(native, name, fullname, class, backend.kind())
}

/// Describes and wraps a native object that belongs to this backend's language.
pub(crate) fn build_handle(
    backend: &dyn Backend,
    native: NativeRef,
    name: &str,
    fullname: String,
) -> Option<ObjHandle> {
    let info = match backend.describe(native) {
        Ok(info) => info,
        Err(err) => {
            debug!("cannot describe {fullname}: {err}");
            return None;
        }
    };
    if info.language != backend.language() {
        debug!(
            "{fullname} is a {:?} object, not native to {}",
            info.language,
            backend.kind()
        );
        return None;
    }
    Some(make_handle(backend, native, &info, name, fullname))
}

/// Resolves a top-level object.
pub(crate) fn resolve_root(backend: &dyn Backend, name: Option<&str>) -> Option<ObjHandle> {
    let Some(native) = backend.root(name) else {
        debug!("no root object {}", name.unwrap_or("<first>"));
        return None;
    };
    let info = backend.describe(native).ok()?;
    let root_name = info
        .name
        .clone()
        .or_else(|| name.map(str::to_string))
        .unwrap_or_default();
    Some(make_handle(backend, native, &info, root_name.clone(), root_name))
}

/// Indices of the elements of generate loop `base` inside `scope`.
pub(crate) fn generate_range(
    backend: &dyn Backend,
    scope: NativeRef,
    base: &str,
) -> Option<IndexRange> {
    let mut indices = Vec::new();
    for child in backend.children(scope, Relation::SubScopes).ok()? {
        let Ok(info) = backend.describe(child) else {
            continue;
        };
        let Some(name) = info.name.as_deref() else {
            continue;
        };
        match info.kind {
            NativeKind::GenerateArray if name == base => {
                for element in backend.children(child, Relation::SubScopes).unwrap_or_default() {
                    let index = backend
                        .describe(element)
                        .ok()
                        .and_then(|e| e.name)
                        .and_then(|n| parse_indexed(&n).map(|(_, i)| i));
                    indices.extend(index);
                }
            }
            NativeKind::GenerateScope => {
                if let Some((b, index)) = parse_indexed(name) {
                    if b == base {
                        indices.push(index);
                    }
                }
            }
            _ => {}
        }
    }
    let left = *indices.iter().min()?;
    let right = *indices.iter().max()?;
    Some(IndexRange::new(left, right, RangeDirection::Ascending))
}

/// Resolves a direct child of `parent` by short name.
pub(crate) fn resolve_by_name(
    backend: &dyn Backend,
    parent: &ObjHandle,
    name: &str,
) -> Option<ObjHandle> {
    if parent.is_pseudo() {
        let (base, index) = parse_indexed(name)?;
        if base != parent.name() {
            return None;
        }
        return resolve_by_index(backend, parent, index);
    }

    if let Some(native) = backend.lookup(parent.native(), name) {
        let info = backend.describe(native).ok()?;
        // An unindexed name that lands on a generate element is an alias for loop[0].
        let aliased = info.kind == NativeKind::GenerateScope && parse_indexed(name).is_none();
        if info.kind == NativeKind::GenerateArray || aliased {
            trace!(
                "{name} under {} is a generate loop ({:?} lookup)",
                parent.fullname(),
                backend.capabilities().generate_lookup
            );
            backend.release(native);
            let range = generate_range(backend, parent.native(), name);
            return Some(ObjHandle::pseudo_region(parent, name, range));
        }
        if info.language != backend.language() {
            debug!("{name} under {} is not native to {}", parent.fullname(), backend.kind());
            return None;
        }
        return Some(make_handle(
            backend,
            native,
            &info,
            name,
            join_path(parent.fullname(), name),
        ));
    }

    // Backends that cannot name a generate array at all: look the elements up by index.
    let range = generate_range(backend, parent.native(), name)?;
    trace!("synthesized generate loop {name} under {}", parent.fullname());
    Some(ObjHandle::pseudo_region(parent, name, Some(range)))
}

/// Resolves the element of `parent` at a logical index.
pub(crate) fn resolve_by_index(
    backend: &dyn Backend,
    parent: &ObjHandle,
    index: i64,
) -> Option<ObjHandle> {
    if parent.object_type() == ObjectType::GenArray {
        let fullname = index_path(parent.fullname(), index);
        for element in [
            format!("{}[{index}]", parent.name()),
            format!("{}({index})", parent.name()),
        ] {
            if let Some(native) = backend.lookup(parent.native(), &element) {
                return build_handle(backend, native, &element, fullname);
            }
        }
        debug!("generate element {fullname} not found");
        return None;
    }

    let range = parent.range()?;
    let offset = match range.offset(index) {
        Ok(offset) => offset,
        Err(err) => {
            debug!("{}: {err}", parent.fullname());
            return None;
        }
    };
    let native = backend.element(parent.native(), offset)?;
    build_handle(
        backend,
        native,
        &format!("{}[{index}]", parent.name()),
        index_path(parent.fullname(), index),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_indexed() {
        assert_eq!(parse_indexed("loop[2]"), Some(("loop", 2)));
        assert_eq!(parse_indexed("gen_blk(10)"), Some(("gen_blk", 10)));
        assert_eq!(parse_indexed("neg[-1]"), Some(("neg", -1)));
        assert_eq!(parse_indexed("loop"), None);
        assert_eq!(parse_indexed("loop[x]"), None);
    }
}
