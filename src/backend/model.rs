//! In-process reference kernel.
//!
//! A small discrete-event kernel over a design described in JSON or built in
//! code. It exists to drive the layer without a vendor simulator: tests, and
//! embeddings that want a scripted design. Options reproduce the quirks real
//! backends have (no per-signal callbacks, the three generate-lookup
//! behaviors, synchronous value-change delivery from inside reactions).
//!
//! Each time slot runs, in order: scheduled stimulus, timed callbacks, the
//! delta loop (value updates, value-change callbacks, read-write callbacks),
//! then read-only callbacks. Next-time-step callbacks fire when time advances.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::callback::UserData;
use crate::classify::{classify, Classification, NativeKind, TypeDesc};
use crate::error::{GpiError, GpiResult};
use crate::hierarchy::parse_indexed;
use crate::iterator::Relation;
use crate::logic::{binstr_to_i64, decode_binstr, encode_binstr, i64_to_binstr, Logic};
use crate::registry;
use crate::types::{IndexRange, Language, ObjectType, SetAction, ValueFormat};
use crate::value::SignalValue;

use super::{
    Backend, BackendKind, Capabilities, GenerateLookup, NativeInfo, NativeRef, NativeRequest,
    NativeToken, ProcessToken, SimulatorInfo,
};

/// A design the kernel elaborates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDesign {
    /// Reported simulator product.
    pub product: String,
    /// Reported simulator version.
    pub version: String,
    /// Time precision as a power of ten seconds.
    pub precision: i32,
    /// Top-level modules and packages.
    pub roots: Vec<ModelObject>,
}

impl Default for ModelDesign {
    fn default() -> Self {
        Self {
            product: "gpi-model".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            precision: -12,
            roots: Vec::new(),
        }
    }
}

impl ModelDesign {
    /// A design with the given top-level objects.
    #[must_use]
    pub fn new(roots: Vec<ModelObject>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    /// Parses a JSON design.
    ///
    /// # Errors
    /// `Config` if the document does not describe a design.
    pub fn from_json(text: &str) -> GpiResult<Self> {
        serde_json::from_str(text).map_err(|e| GpiError::Config {
            message: format!("model design: {e}"),
        })
    }
}

fn untyped() -> TypeDesc {
    TypeDesc::None
}

/// One object of a [`ModelDesign`].
///
/// Children of a scope are its hierarchy. Children of a record are its
/// members. Children of a non-logic array are the members of each element,
/// which the kernel replicates per index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelObject {
    /// Short name. Unnamed objects exercise the no-name iteration results.
    #[serde(default)]
    pub name: Option<String>,
    /// Native kind.
    pub kind: NativeKind,
    /// Native type.
    #[serde(default = "untyped")]
    pub ty: TypeDesc,
    /// Language world; inherited from the parent when absent.
    #[serde(default)]
    pub language: Option<Language>,
    /// Bit width of a packed record.
    #[serde(default)]
    pub width: Option<usize>,
    /// Initial value.
    #[serde(default)]
    pub value: Option<SignalValue>,
    /// See the type-level docs.
    #[serde(default)]
    pub children: Vec<ModelObject>,
}

impl ModelObject {
    /// A named object.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: NativeKind, ty: TypeDesc) -> Self {
        Self {
            name: Some(name.into()),
            kind,
            ty,
            language: None,
            width: None,
            value: None,
            children: Vec::new(),
        }
    }

    /// A module instance.
    #[must_use]
    pub fn module(name: impl Into<String>) -> Self {
        Self::new(name, NativeKind::Module, TypeDesc::None)
    }

    /// A package.
    #[must_use]
    pub fn package(name: impl Into<String>) -> Self {
        Self::new(name, NativeKind::Package, TypeDesc::None)
    }

    /// One generate element, conventionally named `loop[i]`.
    #[must_use]
    pub fn generate_scope(name: impl Into<String>) -> Self {
        Self::new(name, NativeKind::GenerateScope, TypeDesc::None)
    }

    /// A native generate-array object holding generate elements.
    #[must_use]
    pub fn generate_array(name: impl Into<String>) -> Self {
        Self::new(name, NativeKind::GenerateArray, TypeDesc::None)
    }

    /// A stored value (VHDL signal).
    #[must_use]
    pub fn signal(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::new(name, NativeKind::Signal, ty)
    }

    /// A Verilog net.
    #[must_use]
    pub fn net(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::new(name, NativeKind::Net, ty)
    }

    /// A Verilog reg.
    #[must_use]
    pub fn reg(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::new(name, NativeKind::Reg, ty)
    }

    /// A transient value.
    #[must_use]
    pub fn variable(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::new(name, NativeKind::Variable, ty)
    }

    /// A parameter or generic.
    #[must_use]
    pub fn constant(name: impl Into<String>, ty: TypeDesc, value: SignalValue) -> Self {
        Self::new(name, NativeKind::Constant, ty).with_value(value)
    }

    /// A `std_logic_vector(left downto/to right)` signal.
    #[must_use]
    pub fn logic_vector(name: impl Into<String>, left: i64, right: i64) -> Self {
        Self::signal(
            name,
            TypeDesc::array(TypeDesc::std_logic(), IndexRange::from_bounds(left, right)),
        )
    }

    /// Adds a child.
    #[must_use]
    pub fn child(mut self, child: ModelObject) -> Self {
        self.children.push(child);
        self
    }

    /// Adds children.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = ModelObject>) -> Self {
        self.children.extend(children);
        self
    }

    /// Sets the initial value.
    #[must_use]
    pub fn with_value(mut self, value: SignalValue) -> Self {
        self.value = Some(value);
        self
    }

    /// Pins the language world.
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Sets a packed record's width.
    #[must_use]
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    /// Drops the name.
    #[must_use]
    pub fn unnamed(mut self) -> Self {
        self.name = None;
        self
    }
}

/// Backend quirks to reproduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Language world the backend calls native.
    pub language: Language,
    /// When false, value-change and phase callbacks need a sensitivity process.
    pub per_signal_callbacks: bool,
    /// Answer to a lookup of an unindexed generate name.
    pub generate_lookup: GenerateLookup,
    /// Deliver value changes from NO_DELAY and FORCE writes before the write returns.
    pub synchronous_value_change: bool,
    /// Delta cycles per time slot before the kernel gives up settling.
    pub max_deltas: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            language: Language::Verilog,
            per_signal_callbacks: true,
            generate_lookup: GenerateLookup::Native,
            synchronous_value_change: false,
            max_deltas: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Stored {
    Bits(Vec<Logic>),
    Int(i64),
    Real(f64),
    Bytes(Vec<u8>),
}

impl Stored {
    const fn describe(&self) -> &'static str {
        match self {
            Self::Bits(_) => "a bit vector",
            Self::Int(_) => "an integer",
            Self::Real(_) => "a real",
            Self::Bytes(_) => "a string",
        }
    }
}

#[derive(Debug)]
enum Storage {
    None,
    Owned { value: Stored, forced: bool },
    /// One bit of a logic vector owned by another node.
    View { owner: usize, offset: usize },
}

#[derive(Debug)]
struct Node {
    name: Option<String>,
    kind: NativeKind,
    ty: TypeDesc,
    class: Classification,
    language: Language,
    width: Option<usize>,
    children: Vec<usize>,
    elements: Vec<usize>,
    storage: Storage,
}

#[derive(Debug)]
struct Registration {
    request: NativeRequest,
    user_data: *const UserData,
    sensitive: bool,
    process: Option<ProcessToken>,
}

#[derive(Debug)]
struct KernelState {
    info: SimulatorInfo,
    precision: i32,
    options: ModelOptions,
    nodes: Vec<Node>,
    roots: Vec<usize>,
    time: u64,
    started: bool,
    stopped: bool,
    finished: bool,
    registrations: BTreeMap<usize, Registration>,
    next_token: usize,
    timed: BTreeMap<u64, Vec<usize>>,
    stimulus: BTreeMap<u64, Vec<(usize, SignalValue)>>,
    pending: Vec<(usize, Stored)>,
    changed: Vec<usize>,
    processes: usize,
    in_flight: Vec<usize>,
    in_flight_removals: u64,
    released: Vec<NativeRef>,
}

const fn node_ref(index: usize) -> NativeRef {
    NativeRef::from_raw(index + 1)
}

fn initial_value(class: &Classification, language: Language) -> Option<Stored> {
    match class.format {
        ValueFormat::Logic => {
            let fill = match language {
                Language::Vhdl => Logic::Uninitialized,
                Language::Verilog => Logic::Unknown,
            };
            Some(Stored::Bits(vec![fill; class.num_elems.max(1)]))
        }
        ValueFormat::Int | ValueFormat::Bool | ValueFormat::Char | ValueFormat::Enum => {
            Some(Stored::Int(0))
        }
        ValueFormat::Real => Some(Stored::Real(0.0)),
        ValueFormat::Str => Some(Stored::Bytes(if class.range.is_some() {
            vec![b' '; class.num_elems]
        } else {
            Vec::new()
        })),
        ValueFormat::None => None,
    }
}

const fn relation_of(kind: NativeKind) -> Relation {
    match kind {
        NativeKind::Constant => Relation::Parameters,
        NativeKind::Net | NativeKind::Signal => Relation::Nets,
        NativeKind::Reg | NativeKind::Variable | NativeKind::Other => Relation::Variables,
        NativeKind::Module
        | NativeKind::Package
        | NativeKind::GenerateArray
        | NativeKind::GenerateScope => Relation::SubScopes,
    }
}

impl KernelState {
    fn node_index(&self, native: NativeRef) -> GpiResult<usize> {
        native
            .as_raw()
            .checked_sub(1)
            .filter(|&i| i < self.nodes.len())
            .ok_or_else(|| GpiError::native("model", format!("invalid object reference {native:?}")))
    }

    fn node(&self, native: NativeRef) -> GpiResult<&Node> {
        Ok(&self.nodes[self.node_index(native)?])
    }

    fn build(&mut self, object: &ModelObject, inherited: Language) -> GpiResult<usize> {
        let language = object.language.unwrap_or(inherited);
        let mut class = classify(object.kind, &object.ty);
        if class.object_type == ObjectType::PackedStructure {
            if let Some(width) = object.width {
                class.num_elems = width;
            }
        }
        let storage = initial_value(&class, language)
            .map_or(Storage::None, |value| Storage::Owned { value, forced: false });
        let id = self.nodes.len();
        self.nodes.push(Node {
            name: object.name.clone(),
            kind: object.kind,
            ty: object.ty.clone(),
            class,
            language,
            width: object.width,
            children: Vec::new(),
            elements: Vec::new(),
            storage,
        });
        if let Some(value) = &object.value {
            let stored = self.convert(id, value)?;
            self.apply(id, stored, SetAction::NoDelay)?;
        }

        match &object.ty {
            TypeDesc::Array { element, range } if class.object_type != ObjectType::String => {
                self.build_elements(id, object, element, *range, language)?;
            }
            _ => {
                for child in &object.children {
                    let child = self.build(child, language)?;
                    self.nodes[id].children.push(child);
                }
            }
        }
        Ok(id)
    }

    fn build_elements(
        &mut self,
        owner: usize,
        object: &ModelObject,
        element: &TypeDesc,
        range: IndexRange,
        language: Language,
    ) -> GpiResult<()> {
        let base = object.name.clone().unwrap_or_default();
        let packed_logic = self.nodes[owner].class.format == ValueFormat::Logic;
        for (offset, index) in range.indices().enumerate() {
            let name = format!("{base}[{index}]");
            let id = if packed_logic {
                let id = self.nodes.len();
                self.nodes.push(Node {
                    name: Some(name),
                    kind: object.kind,
                    ty: element.clone(),
                    class: classify(object.kind, element),
                    language,
                    width: None,
                    children: Vec::new(),
                    elements: Vec::new(),
                    storage: Storage::View { owner, offset },
                });
                id
            } else {
                let template = ModelObject {
                    name: Some(name),
                    kind: object.kind,
                    ty: element.clone(),
                    language: Some(language),
                    width: None,
                    value: None,
                    children: object.children.clone(),
                };
                self.build(&template, language)?
            };
            self.nodes[owner].elements.push(id);
        }
        Ok(())
    }

    fn named(&self, index: usize, name: &str) -> bool {
        self.nodes[index].name.as_deref() == Some(name)
    }

    fn find_child(&self, parent: usize, name: &str) -> Option<usize> {
        let node = &self.nodes[parent];
        let direct = node.children.iter().copied().find(|&c| self.named(c, name));
        let indexed = parse_indexed(name);

        if let Some(child) = direct {
            if self.nodes[child].kind != NativeKind::GenerateArray || indexed.is_some() {
                return Some(child);
            }
            return match self.options.generate_lookup {
                GenerateLookup::Native => Some(child),
                GenerateLookup::AliasFirst => self.nodes[child].children.first().copied(),
                GenerateLookup::Fail => None,
            };
        }

        if indexed.is_some() {
            // Elements of a native generate array are addressed from the enclosing scope.
            return node
                .children
                .iter()
                .filter(|&&c| self.nodes[c].kind == NativeKind::GenerateArray)
                .flat_map(|&c| self.nodes[c].children.iter().copied())
                .find(|&c| self.named(c, name));
        }

        if self.options.generate_lookup == GenerateLookup::AliasFirst {
            return node.children.iter().copied().find(|&c| {
                self.nodes[c].kind == NativeKind::GenerateScope
                    && self.nodes[c]
                        .name
                        .as_deref()
                        .and_then(parse_indexed)
                        .is_some_and(|(base, _)| base == name)
            });
        }
        None
    }

    fn resolve_path(&self, path: &str) -> GpiResult<usize> {
        let missing = || GpiError::native("model", format!("no object {path}"));
        let mut parts = path.split('.');
        let first = parts.next().ok_or_else(missing)?;
        let mut current = self
            .roots
            .iter()
            .copied()
            .find(|&r| self.named(r, first))
            .ok_or_else(missing)?;
        for part in parts {
            current = match self.find_child(current, part) {
                Some(child) => child,
                None => {
                    let (base, index) = parse_indexed(part).ok_or_else(missing)?;
                    let array = self.find_child(current, base).ok_or_else(missing)?;
                    let node = &self.nodes[array];
                    let offset = node.class.range.ok_or_else(missing)?.offset(index)?;
                    *node.elements.get(offset).ok_or_else(missing)?
                }
            };
        }
        Ok(current)
    }

    fn effective(&self, index: usize) -> GpiResult<Stored> {
        match &self.nodes[index].storage {
            Storage::Owned { value, .. } => Ok(value.clone()),
            Storage::View { owner, offset } => match &self.nodes[*owner].storage {
                Storage::Owned {
                    value: Stored::Bits(bits),
                    ..
                } => Ok(Stored::Bits(vec![bits[*offset]])),
                _ => Err(GpiError::native("model", "bit view over a non-vector")),
            },
            Storage::None => Err(GpiError::native(
                "get_value",
                format!("{} carries no value", self.nodes[index].class.object_type),
            )),
        }
    }

    fn convert(&self, index: usize, value: &SignalValue) -> GpiResult<Stored> {
        let shape = self.effective(index)?;
        Ok(match (&shape, value) {
            (Stored::Bits(current), SignalValue::BinStr(s)) => {
                let bits = decode_binstr(s)?;
                if bits.len() != current.len() {
                    return Err(GpiError::invalid_value(format!(
                        "'{s}' does not fit {} bits",
                        current.len()
                    )));
                }
                Stored::Bits(bits)
            }
            (Stored::Bits(current), SignalValue::Long(v)) => {
                Stored::Bits(decode_binstr(&i64_to_binstr(*v, current.len()))?)
            }
            (Stored::Int(_), SignalValue::Long(v)) => Stored::Int(*v),
            (Stored::Int(_), SignalValue::BinStr(s)) => Stored::Int(binstr_to_i64(s, true)?),
            (Stored::Real(_), SignalValue::Real(f)) => Stored::Real(*f),
            (Stored::Bytes(_), SignalValue::Str(b)) => Stored::Bytes(b.clone()),
            (shape, value) => {
                return Err(GpiError::native(
                    "set_value",
                    format!("cannot store {} into {}", value.accessor(), shape.describe()),
                ))
            }
        })
    }

    /// Updates a node and returns every node whose visible value changed.
    fn apply(&mut self, index: usize, stored: Stored, action: SetAction) -> GpiResult<Vec<usize>> {
        let (owner, offset) = match self.nodes[index].storage {
            Storage::View { owner, offset } => (owner, Some(offset)),
            Storage::Owned { .. } => (index, None),
            Storage::None => {
                return Err(GpiError::native("set_value", "object carries no value"));
            }
        };

        if let Some(offset) = offset {
            if matches!(action, SetAction::Force | SetAction::Release) {
                return Err(GpiError::native(
                    "set_value",
                    "force and release apply to whole signals only",
                ));
            }
            let Stored::Bits(bit) = stored else {
                return Err(GpiError::native("set_value", "bit select takes a logic value"));
            };
            let Storage::Owned {
                value: Stored::Bits(bits),
                forced,
            } = &mut self.nodes[owner].storage
            else {
                return Err(GpiError::native("model", "bit view over a non-vector"));
            };
            if *forced || bits[offset] == bit[0] {
                return Ok(Vec::new());
            }
            bits[offset] = bit[0];
            return Ok(vec![owner, index]);
        }

        let Storage::Owned { value, forced } = &mut self.nodes[index].storage else {
            return Ok(Vec::new());
        };
        match action {
            SetAction::Force => *forced = true,
            SetAction::Release => *forced = false,
            SetAction::Deposit | SetAction::NoDelay if *forced => return Ok(Vec::new()),
            SetAction::Deposit | SetAction::NoDelay => {}
        }
        if *value == stored {
            return Ok(Vec::new());
        }
        let old = std::mem::replace(value, stored);
        let mut changed = vec![index];
        if let (Stored::Bits(old), Storage::Owned { value: Stored::Bits(new), .. }) =
            (&old, &self.nodes[index].storage)
        {
            let node = &self.nodes[index];
            changed.extend(
                node.elements
                    .iter()
                    .enumerate()
                    .filter(|(off, _)| old.get(*off) != new.get(*off))
                    .map(|(_, &e)| e),
            );
        }
        Ok(changed)
    }

    fn watchers(&self, changed: &[usize]) -> Vec<usize> {
        let mut tokens = Vec::new();
        for &index in changed {
            let target = NativeRequest::ValueChange(node_ref(index));
            tokens.extend(
                self.registrations
                    .iter()
                    .filter(|(_, reg)| reg.sensitive && reg.request == target)
                    .map(|(&token, _)| token),
            );
        }
        tokens
    }

    fn phase_tokens(&self, request: NativeRequest) -> Vec<usize> {
        self.registrations
            .iter()
            .filter(|(_, reg)| reg.sensitive && reg.request == request)
            .map(|(&token, _)| token)
            .collect()
    }

    fn register(
        &mut self,
        request: NativeRequest,
        user_data: &UserData,
        process: Option<ProcessToken>,
    ) -> GpiResult<NativeToken> {
        if let NativeRequest::ValueChange(native) = request {
            let index = self.node_index(native)?;
            self.effective(index)?;
        }
        let token = self.next_token;
        self.next_token += 1;
        self.registrations.insert(
            token,
            Registration {
                request,
                user_data: user_data as *const UserData,
                sensitive: true,
                process,
            },
        );
        if let NativeRequest::AfterDelay(delay) = request {
            self.timed
                .entry(self.time.saturating_add(delay))
                .or_default()
                .push(token);
        }
        trace!("registered {} as #{token}", request.reason());
        Ok(NativeToken(token))
    }

    fn next_event_time(&self) -> Option<u64> {
        let timed = self.timed.keys().next().copied();
        let stimulus = self.stimulus.keys().next().copied();
        match (timed, stimulus) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Handle to a running model kernel. Clones share the same kernel.
#[derive(Debug, Clone)]
pub struct ModelKernel {
    state: Rc<RefCell<KernelState>>,
}

impl ModelKernel {
    /// Elaborates `design`.
    ///
    /// # Errors
    /// `InvalidValue` or `Native` if an initial value does not fit its object.
    pub fn new(design: ModelDesign, options: ModelOptions) -> GpiResult<Self> {
        let mut state = KernelState {
            info: SimulatorInfo {
                product: design.product.clone(),
                version: design.version.clone(),
            },
            precision: design.precision,
            options,
            nodes: Vec::new(),
            roots: Vec::new(),
            time: 0,
            started: false,
            stopped: false,
            finished: false,
            registrations: BTreeMap::new(),
            next_token: 1,
            timed: BTreeMap::new(),
            stimulus: BTreeMap::new(),
            pending: Vec::new(),
            changed: Vec::new(),
            processes: 0,
            in_flight: Vec::new(),
            in_flight_removals: 0,
            released: Vec::new(),
        };
        for root in &design.roots {
            let id = state.build(root, options.language)?;
            state.roots.push(id);
        }
        debug!(
            "elaborated {} objects under {} roots",
            state.nodes.len(),
            state.roots.len()
        );
        Ok(Self {
            state: Rc::new(RefCell::new(state)),
        })
    }

    /// Elaborates a JSON design.
    ///
    /// # Errors
    /// `Config` for a malformed document, otherwise as [`ModelKernel::new`].
    pub fn from_json(text: &str, options: ModelOptions) -> GpiResult<Self> {
        Self::new(ModelDesign::from_json(text)?, options)
    }

    /// A backend bound to this kernel.
    #[must_use]
    pub fn backend(&self) -> ModelBackend {
        ModelBackend {
            kernel: self.clone(),
        }
    }

    /// Current time.
    #[must_use]
    pub fn time(&self) -> u64 {
        self.state.borrow().time
    }

    /// True once end of simulation has been delivered.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.borrow().finished
    }

    /// True once a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.borrow().stopped
    }

    /// Native registrations currently held, sensitive or not.
    #[must_use]
    pub fn live_registrations(&self) -> usize {
        self.state.borrow().registrations.len()
    }

    /// Sensitivity processes created so far.
    #[must_use]
    pub fn processes(&self) -> usize {
        self.state.borrow().processes
    }

    /// Registrations destroyed while their own delivery was on the stack.
    /// Real simulators misbehave on this; it must stay zero.
    #[must_use]
    pub fn in_flight_removals(&self) -> u64 {
        self.state.borrow().in_flight_removals
    }

    /// Native references the layer has released, in order.
    #[must_use]
    pub fn released(&self) -> Vec<NativeRef> {
        self.state.borrow().released.clone()
    }

    /// Schedules a deposit on `path` (dotted, from a root) at absolute `time`.
    ///
    /// # Errors
    /// `Native` if the path does not name a value-carrying object.
    pub fn schedule_value(&self, time: u64, path: &str, value: SignalValue) -> GpiResult<()> {
        let mut state = self.state.borrow_mut();
        let index = state.resolve_path(path)?;
        state.convert(index, &value)?;
        state.stimulus.entry(time).or_default().push((index, value));
        Ok(())
    }

    /// Current value of `path` in its natural encoding.
    #[must_use]
    pub fn value_of(&self, path: &str) -> Option<SignalValue> {
        let state = self.state.borrow();
        let index = state.resolve_path(path).ok()?;
        Some(match state.effective(index).ok()? {
            Stored::Bits(bits) => SignalValue::BinStr(encode_binstr(&bits)),
            Stored::Int(v) => SignalValue::Long(v),
            Stored::Real(f) => SignalValue::Real(f),
            Stored::Bytes(b) => SignalValue::Str(b),
        })
    }

    /// Delivers start of simulation, once.
    pub fn start(&self) {
        let tokens = {
            let mut state = self.state.borrow_mut();
            if state.started {
                return;
            }
            state.started = true;
            state.phase_tokens(NativeRequest::StartOfSimulation)
        };
        self.deliver(tokens);
    }

    /// Delivers end of simulation, once.
    pub fn finish(&self) {
        let tokens = {
            let mut state = self.state.borrow_mut();
            if state.finished {
                return;
            }
            state.finished = true;
            state.phase_tokens(NativeRequest::EndOfSimulation)
        };
        self.deliver(tokens);
    }

    /// Runs every time slot up to and including `end`, then parks at `end`.
    ///
    /// A stop request ends the run and delivers end of simulation.
    pub fn run_until(&self, end: u64) -> u64 {
        self.start();
        loop {
            if self.is_finished() {
                break;
            }
            if self.is_stopped() {
                self.finish();
                break;
            }
            self.run_slot();
            if self.is_stopped() {
                self.finish();
                break;
            }
            let (now, next) = {
                let state = self.state.borrow();
                (state.time, state.next_event_time())
            };
            match next {
                // Zero-delay work registered after its slot ran.
                Some(t) if t <= now => {}
                Some(t) if t <= end => {
                    debug!("advancing to {t}");
                    let tokens = {
                        let mut state = self.state.borrow_mut();
                        state.time = t;
                        state.phase_tokens(NativeRequest::NextTimeStep)
                    };
                    self.deliver(tokens);
                }
                _ => {
                    if end != u64::MAX && end > now {
                        self.state.borrow_mut().time = end;
                    }
                    break;
                }
            }
        }
        self.time()
    }

    /// Runs until no events remain, then delivers end of simulation.
    ///
    /// Never returns while a callback keeps re-arming a timer; use
    /// [`ModelKernel::run_until`] for free-running clocks.
    pub fn run(&self) -> u64 {
        self.run_until(u64::MAX);
        self.finish();
        self.time()
    }

    fn run_slot(&self) {
        {
            let mut state = self.state.borrow_mut();
            let now = state.time;
            for (index, value) in state.stimulus.remove(&now).unwrap_or_default() {
                match state.convert(index, &value) {
                    Ok(stored) => state.pending.push((index, stored)),
                    Err(err) => warn!("dropping stimulus at {now}: {err}"),
                }
            }
        }
        loop {
            let due = {
                let mut state = self.state.borrow_mut();
                let now = state.time;
                state.timed.remove(&now)
            };
            match due {
                Some(tokens) => self.deliver(tokens),
                None => break,
            }
        }
        self.settle();
        let read_only = self.state.borrow().phase_tokens(NativeRequest::ReadOnly);
        self.deliver(read_only);
    }

    fn settle(&self) {
        let max_deltas = self.state.borrow().options.max_deltas;
        for delta in 0..max_deltas {
            let watchers = {
                let mut state = self.state.borrow_mut();
                let mut changed = std::mem::take(&mut state.changed);
                for (index, stored) in std::mem::take(&mut state.pending) {
                    match state.apply(index, stored, SetAction::Deposit) {
                        Ok(c) => changed.extend(c),
                        Err(err) => warn!("dropping deposit: {err}"),
                    }
                }
                state.watchers(&changed)
            };
            let woke = !watchers.is_empty();
            self.deliver(watchers);

            let read_write = self.state.borrow().phase_tokens(NativeRequest::ReadWrite);
            let quiet = {
                let state = self.state.borrow();
                state.pending.is_empty() && state.changed.is_empty()
            };
            if !woke && read_write.is_empty() && quiet {
                return;
            }
            trace!("delta {delta}");
            self.deliver(read_write);
        }
        warn!("no convergence after {max_deltas} delta cycles");
    }

    fn deliver(&self, tokens: Vec<usize>) {
        for token in tokens {
            let (user_data, reason) = {
                let mut state = self.state.borrow_mut();
                let Some(reg) = state.registrations.get(&token) else {
                    continue;
                };
                if !reg.sensitive {
                    continue;
                }
                // SAFETY: the layer keeps the pointee alive until the
                // registration is removed, and removal drops it from this map.
                let user_data = unsafe { *reg.user_data };
                let reason = reg.request.reason();
                trace!(
                    "delivering {reason} #{token}{}",
                    reg.process.map_or(String::new(), |p| format!(" via process {}", p.0))
                );
                if reason.is_one_shot() {
                    state.registrations.remove(&token);
                }
                state.in_flight.push(token);
                (user_data, reason)
            };
            registry::deliver(user_data, Some(reason));
            self.state.borrow_mut().in_flight.pop();
        }
    }

    fn write(&self, native: NativeRef, value: &SignalValue, action: SetAction) -> GpiResult<()> {
        let notify = {
            let mut state = self.state.borrow_mut();
            let index = state.node_index(native)?;
            let stored = state.convert(index, value)?;
            if action == SetAction::Deposit {
                state.pending.push((index, stored));
                return Ok(());
            }
            let changed = state.apply(index, stored, action)?;
            if state.options.synchronous_value_change {
                state.watchers(&changed)
            } else {
                state.changed.extend(changed);
                Vec::new()
            }
        };
        self.deliver(notify);
        Ok(())
    }
}

/// [`Backend`] over a [`ModelKernel`].
#[derive(Debug, Clone)]
pub struct ModelBackend {
    kernel: ModelKernel,
}

impl ModelBackend {
    /// The kernel this backend drives.
    #[must_use]
    pub const fn kernel(&self) -> &ModelKernel {
        &self.kernel
    }

    fn with_state<T>(&self, f: impl FnOnce(&KernelState) -> T) -> T {
        f(&self.kernel.state.borrow())
    }

    fn with_state_mut<T>(&self, f: impl FnOnce(&mut KernelState) -> T) -> T {
        f(&mut self.kernel.state.borrow_mut())
    }
}

impl Backend for ModelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Model
    }

    fn language(&self) -> Language {
        self.with_state(|s| s.options.language)
    }

    fn product(&self) -> SimulatorInfo {
        self.with_state(|s| s.info.clone())
    }

    fn capabilities(&self) -> Capabilities {
        self.with_state(|s| Capabilities {
            per_signal_callbacks: s.options.per_signal_callbacks,
            generate_lookup: s.options.generate_lookup,
        })
    }

    fn root(&self, name: Option<&str>) -> Option<NativeRef> {
        self.with_state(|s| match name {
            Some(name) => s.roots.iter().copied().find(|&r| s.named(r, name)),
            None => s.roots.first().copied(),
        })
        .map(node_ref)
    }

    fn lookup(&self, parent: NativeRef, name: &str) -> Option<NativeRef> {
        self.with_state(|s| {
            let parent = s.node_index(parent).ok()?;
            s.find_child(parent, name)
        })
        .map(node_ref)
    }

    fn element(&self, parent: NativeRef, offset: usize) -> Option<NativeRef> {
        self.with_state(|s| s.node(parent).ok()?.elements.get(offset).copied())
            .map(node_ref)
    }

    fn children(&self, parent: NativeRef, relation: Relation) -> GpiResult<Vec<NativeRef>> {
        self.with_state(|s| {
            let node = s.node(parent)?;
            let children = match relation {
                Relation::Drivers | Relation::Loads => {
                    return Err(GpiError::native(
                        "children",
                        format!("{relation:?} are not tracked by the model kernel"),
                    ));
                }
                Relation::Elements => node.elements.clone(),
                Relation::Members => match node.ty {
                    TypeDesc::Record { .. } => node.children.clone(),
                    _ => Vec::new(),
                },
                _ if matches!(node.ty, TypeDesc::Record { .. }) => Vec::new(),
                relation => node
                    .children
                    .iter()
                    .copied()
                    .filter(|&c| relation_of(s.nodes[c].kind) == relation)
                    .collect(),
            };
            Ok(children.into_iter().map(node_ref).collect())
        })
    }

    fn describe(&self, native: NativeRef) -> GpiResult<NativeInfo> {
        self.with_state(|s| {
            let node = s.node(native)?;
            Ok(NativeInfo {
                kind: node.kind,
                ty: node.ty.clone(),
                name: node.name.clone(),
                language: node.language,
                size: node.width,
            })
        })
    }

    fn release(&self, native: NativeRef) {
        self.with_state_mut(|s| s.released.push(native));
    }

    fn get_binstr(&self, native: NativeRef) -> GpiResult<String> {
        self.with_state(|s| {
            let index = s.node_index(native)?;
            match s.effective(index)? {
                Stored::Bits(bits) => Ok(encode_binstr(&bits)),
                Stored::Int(v) if s.nodes[index].class.format == ValueFormat::Bool => {
                    Ok(if v == 0 { "0" } else { "1" }.to_string())
                }
                Stored::Int(v) => Ok(i64_to_binstr(v, 32)),
                other => Err(GpiError::native(
                    "get_binstr",
                    format!("object holds {}", other.describe()),
                )),
            }
        })
    }

    fn get_str(&self, native: NativeRef) -> GpiResult<Vec<u8>> {
        self.with_state(|s| match s.effective(s.node_index(native)?)? {
            Stored::Bytes(bytes) => Ok(bytes),
            other => Err(GpiError::native(
                "get_str",
                format!("object holds {}", other.describe()),
            )),
        })
    }

    fn get_real(&self, native: NativeRef) -> GpiResult<f64> {
        self.with_state(|s| match s.effective(s.node_index(native)?)? {
            Stored::Real(f) => Ok(f),
            other => Err(GpiError::native(
                "get_real",
                format!("object holds {}", other.describe()),
            )),
        })
    }

    fn get_long(&self, native: NativeRef) -> GpiResult<i64> {
        self.with_state(|s| match s.effective(s.node_index(native)?)? {
            Stored::Bits(bits) => binstr_to_i64(&encode_binstr(&bits), false),
            Stored::Int(v) => Ok(v),
            other => Err(GpiError::native(
                "get_long",
                format!("object holds {}", other.describe()),
            )),
        })
    }

    fn set_value(&self, native: NativeRef, value: &SignalValue, action: SetAction) -> GpiResult<()> {
        self.kernel.write(native, value, action)
    }

    fn register_callback(&self, request: NativeRequest, user_data: &UserData) -> GpiResult<NativeToken> {
        self.with_state_mut(|s| {
            let synthesized = matches!(request, NativeRequest::ValueChange(_))
                || request.reason().is_phase();
            if synthesized && !s.options.per_signal_callbacks {
                return Err(GpiError::native(
                    "register_callback",
                    format!("{} callbacks need a sensitivity process", request.reason()),
                ));
            }
            s.register(request, user_data, None)
        })
    }

    fn remove_callback(&self, token: NativeToken) -> GpiResult<()> {
        self.with_state_mut(|s| {
            if s.in_flight.contains(&token.0) {
                warn!("registration #{} destroyed during its own delivery", token.0);
                s.in_flight_removals += 1;
            }
            s.registrations
                .remove(&token.0)
                .map(|_| ())
                .ok_or_else(|| GpiError::native("remove_callback", format!("no registration #{}", token.0)))
        })
    }

    fn desensitize(&self, token: NativeToken) -> GpiResult<()> {
        self.with_state_mut(|s| match s.registrations.get_mut(&token.0) {
            Some(reg) => {
                reg.sensitive = false;
                Ok(())
            }
            None => Err(GpiError::native("desensitize", format!("no registration #{}", token.0))),
        })
    }

    fn create_process(&self) -> GpiResult<ProcessToken> {
        self.with_state_mut(|s| {
            s.processes += 1;
            Ok(ProcessToken(s.processes))
        })
    }

    fn sensitize(
        &self,
        process: ProcessToken,
        request: NativeRequest,
        user_data: &UserData,
    ) -> GpiResult<NativeToken> {
        self.with_state_mut(|s| {
            if process.0 == 0 || process.0 > s.processes {
                return Err(GpiError::native("sensitize", "unknown process"));
            }
            s.register(request, user_data, Some(process))
        })
    }

    fn sim_time(&self) -> u64 {
        self.kernel.time()
    }

    fn sim_precision(&self) -> i32 {
        self.with_state(|s| s.precision)
    }

    fn stop(&self) {
        debug!("stop requested");
        self.with_state_mut(|s| s.stopped = true);
    }
}
