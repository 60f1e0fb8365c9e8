//! Ordered traversal of one-to-many relationships.
//!
//! Every classification maps to a fixed list of relationship kinds. The
//! iterator materializes the full child list of one kind at a time (native
//! enumeration is call-based everywhere), yields from it, and moves on to the
//! next kind when it runs dry.

use std::collections::HashSet;
use std::rc::Rc;

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::backend::NativeRef;
use crate::classify::NativeKind;
use crate::gpi::Gpi;
use crate::handle::{index_path, join_path, Handle, ObjHandle};
use crate::hierarchy::{generate_range, make_handle, parse_indexed};
use crate::types::ObjectType;

/// What to enumerate from a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterSelector {
    /// Hierarchical children.
    #[default]
    Objects,
    /// Drivers of a value-carrying object.
    Drivers,
    /// Loads of a value-carrying object.
    Loads,
}

/// One relationship kind a backend can enumerate.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Parameters, generics and constants.
    Parameters,
    Nets,
    Variables,
    /// Instances and generate elements.
    SubScopes,
    /// Record or struct fields.
    Members,
    /// Array elements, in storage order.
    Elements,
    Drivers,
    Loads,
}

const SCOPE: &[Relation] = &[
    Relation::Parameters,
    Relation::Nets,
    Relation::Variables,
    Relation::SubScopes,
];
const PACKAGE: &[Relation] = &[Relation::Parameters, Relation::Variables];
const GENERATE: &[Relation] = &[Relation::SubScopes];
const MEMBERS: &[Relation] = &[Relation::Members];
const ELEMENTS: &[Relation] = &[Relation::Elements];
const DRIVERS: &[Relation] = &[Relation::Drivers];
const LOADS: &[Relation] = &[Relation::Loads];

/// Relationship kinds visited for a parent classification, in priority order.
///
/// Arrays yield their elements only and records their members only; an array
/// of records therefore iterates elements, each of which iterates members.
#[must_use]
pub fn default_relations(object_type: ObjectType, selector: IterSelector) -> &'static [Relation] {
    match selector {
        IterSelector::Objects => match object_type {
            ObjectType::Module => SCOPE,
            ObjectType::Package => PACKAGE,
            ObjectType::GenArray => GENERATE,
            ObjectType::Structure | ObjectType::PackedStructure => MEMBERS,
            ObjectType::Array => ELEMENTS,
            _ => &[],
        },
        IterSelector::Drivers if object_type.is_value() => DRIVERS,
        IterSelector::Loads if object_type.is_value() => LOADS,
        IterSelector::Drivers | IterSelector::Loads => &[],
    }
}

/// One step of an iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum IterItem {
    /// A child native to the active backend.
    Native(Handle),
    /// A native child whose name the backend could not produce. The handle's
    /// short name is empty; the caller decides what to call it.
    NativeNoName(Handle),
    /// A child from a different language world, to be resolved by name through
    /// another backend.
    NotNative {
        /// Short name reported by the backend.
        name: String,
        /// Raw native reference.
        native: NativeRef,
    },
    /// A foreign or undescribable child with no obtainable name.
    NotNativeNoName(NativeRef),
}

impl IterItem {
    /// The handle, for native results.
    #[must_use]
    pub fn handle(&self) -> Option<&Handle> {
        match self {
            Self::Native(handle) | Self::NativeNoName(handle) => Some(handle),
            Self::NotNative { .. } | Self::NotNativeNoName(_) => None,
        }
    }
}

/// Cursor over the children of one parent.
///
/// Not tied to a borrow of [`Gpi`] so it can be handed across the C ABI; each
/// step takes the layer explicitly.
#[derive(Debug)]
pub struct GpiIterator {
    parent: Handle,
    relations: &'static [Relation],
    next_relation: usize,
    relation: Option<Relation>,
    current: Vec<NativeRef>,
    cursor: usize,
    generate_seen: HashSet<String>,
}

impl GpiIterator {
    pub(crate) fn new(parent: Handle, relations: &'static [Relation]) -> Self {
        Self {
            parent,
            relations,
            next_relation: 0,
            relation: None,
            current: Vec::new(),
            cursor: 0,
            generate_seen: HashSet::new(),
        }
    }

    /// The parent being enumerated.
    #[must_use]
    pub fn parent(&self) -> &Handle {
        &self.parent
    }

    /// Relationship kind currently being yielded from.
    #[must_use]
    pub const fn relation(&self) -> Option<Relation> {
        self.relation
    }

    /// Advances the iterator. `None` is END.
    pub fn next_item(&mut self, gpi: &Gpi) -> Option<IterItem> {
        loop {
            while self.cursor < self.current.len() {
                let offset = self.cursor;
                let native = self.current[offset];
                self.cursor += 1;
                let relation = self.relation?;
                if let Some(item) = self.visit(gpi, relation, offset, native) {
                    return Some(item);
                }
            }
            if !self.advance(gpi) {
                return None;
            }
        }
    }

    /// Materializes the next relationship kind. Returns false at END.
    fn advance(&mut self, gpi: &Gpi) -> bool {
        let backend = gpi.backend();
        while let Some(&relation) = self.relations.get(self.next_relation) {
            self.next_relation += 1;
            // Generate elements are region-like; nothing else lives under a pseudo-region.
            if self.parent.is_pseudo() && relation != Relation::SubScopes {
                continue;
            }
            match backend.children(self.parent.native(), relation) {
                Ok(mut children) => {
                    if self.parent.is_pseudo() {
                        children = self.expand_generate_arrays(gpi, children);
                    }
                    trace!(
                        "{} children of {} under {relation:?}",
                        children.len(),
                        self.parent.fullname()
                    );
                    self.relation = Some(relation);
                    self.current = children;
                    self.cursor = 0;
                    return true;
                }
                Err(err) => {
                    warn!(
                        "cannot traverse {relation:?} of {} ({}): {err}",
                        self.parent.fullname(),
                        self.parent.object_type()
                    );
                }
            }
        }
        self.relation = None;
        self.current.clear();
        self.cursor = 0;
        false
    }

    /// Replaces a native generate-array object named like the pseudo parent by
    /// its elements.
    fn expand_generate_arrays(&self, gpi: &Gpi, children: Vec<NativeRef>) -> Vec<NativeRef> {
        let backend = gpi.backend();
        let mut expanded = Vec::with_capacity(children.len());
        for child in children {
            let is_array = backend.describe(child).is_ok_and(|info| {
                info.kind == NativeKind::GenerateArray
                    && info.name.as_deref() == Some(self.parent.name())
            });
            if is_array {
                expanded.extend(
                    backend
                        .children(child, Relation::SubScopes)
                        .unwrap_or_default(),
                );
            } else {
                expanded.push(child);
            }
        }
        expanded
    }

    fn visit(
        &mut self,
        gpi: &Gpi,
        relation: Relation,
        offset: usize,
        native: NativeRef,
    ) -> Option<IterItem> {
        let backend = gpi.backend();
        let Ok(info) = backend.describe(native) else {
            return Some(IterItem::NotNativeNoName(native));
        };

        if info.language != backend.language() {
            return Some(match info.name {
                Some(name) => IterItem::NotNative { name, native },
                None => IterItem::NotNativeNoName(native),
            });
        }

        if self.parent.is_pseudo() {
            let name = info.name.clone()?;
            let (base, index) = parse_indexed(&name)?;
            if base != self.parent.name() || info.kind != NativeKind::GenerateScope {
                return None;
            }
            let fullname = index_path(self.parent.fullname(), index);
            let handle = make_handle(backend, native, &info, name, fullname);
            return Some(IterItem::Native(gpi.intern(handle)));
        }

        if relation == Relation::SubScopes {
            let generate = match (info.kind, info.name.as_deref()) {
                (NativeKind::GenerateArray, Some(name)) => Some(name.to_string()),
                (NativeKind::GenerateScope, Some(name)) => {
                    parse_indexed(name).map(|(base, _)| base.to_string())
                }
                _ => None,
            };
            if let Some(base) = generate {
                if !self.generate_seen.insert(base.clone()) {
                    return None;
                }
                let range = generate_range(backend, self.parent.native(), &base);
                let handle = ObjHandle::pseudo_region(&self.parent, base, range);
                return Some(IterItem::Native(gpi.intern(handle)));
            }
        }

        if relation == Relation::Elements {
            let index = self.parent.range().and_then(|r| r.index(offset))?;
            let name = format!("{}[{index}]", self.parent.name());
            let fullname = index_path(self.parent.fullname(), index);
            let handle = make_handle(backend, native, &info, name, fullname);
            return Some(IterItem::Native(gpi.intern(handle)));
        }

        match info.name.clone() {
            Some(name) => {
                let fullname = join_path(self.parent.fullname(), &name);
                let handle = make_handle(backend, native, &info, name, fullname);
                Some(IterItem::Native(gpi.intern(handle)))
            }
            None => {
                // No path of its own, so it stays out of the handle cache.
                let fullname = self.parent.fullname().to_string();
                let handle = make_handle(backend, native, &info, "", fullname);
                Some(IterItem::NativeNoName(Rc::new(handle)))
            }
        }
    }
}

/// [`GpiIterator`] bound to a [`Gpi`], usable as a std iterator.
pub struct Children<'a> {
    gpi: &'a Gpi,
    inner: GpiIterator,
}

impl<'a> Children<'a> {
    pub(crate) fn new(gpi: &'a Gpi, inner: GpiIterator) -> Self {
        Self { gpi, inner }
    }
}

impl Iterator for Children<'_> {
    type Item = IterItem;

    fn next(&mut self) -> Option<IterItem> {
        self.inner.next_item(self.gpi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_relation_order() {
        assert_eq!(
            default_relations(ObjectType::Module, IterSelector::Objects),
            &[
                Relation::Parameters,
                Relation::Nets,
                Relation::Variables,
                Relation::SubScopes
            ]
        );
        assert_eq!(
            default_relations(ObjectType::GenArray, IterSelector::Objects),
            &[Relation::SubScopes]
        );
    }

    #[test]
    fn test_composites_never_mix_members_and_elements() {
        assert_eq!(
            default_relations(ObjectType::Array, IterSelector::Objects),
            &[Relation::Elements]
        );
        assert_eq!(
            default_relations(ObjectType::PackedStructure, IterSelector::Objects),
            &[Relation::Members]
        );
        assert!(default_relations(ObjectType::LogicArray, IterSelector::Objects).is_empty());
    }

    #[test]
    fn test_driver_selectors_only_apply_to_values() {
        assert_eq!(
            default_relations(ObjectType::Net, IterSelector::Drivers),
            &[Relation::Drivers]
        );
        assert!(default_relations(ObjectType::Module, IterSelector::Loads).is_empty());
    }
}
