//! Backend contract.
//!
//! Every native simulator API is wrapped by one implementation of [`Backend`].
//! The handle model, iterator, value codec and callback dispatcher are written
//! against this trait only, so backend differences never reach callers.
//!
//! Exactly one backend is active per process (see [`crate::registry`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::callback::UserData;
use crate::classify::{NativeKind, TypeDesc};
use crate::error::{GpiError, GpiResult};
use crate::iterator::{default_relations, IterSelector, Relation};
use crate::types::{CallbackReason, Language, ObjectType, SetAction};
use crate::value::SignalValue;

/// In-process reference kernel.
pub mod model;

/// Verilog VPI backend.
#[cfg(feature = "vpi")]
pub mod vpi;

pub use model::{ModelBackend, ModelDesign, ModelKernel, ModelOptions, ModelObject};

/// Non-owning reference to a native simulator object.
///
/// The simulator owns the object; this layer only ever releases it through the
/// backend's own release call, and only where the native API documents one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeRef(usize);

impl NativeRef {
    /// Wraps an opaque native value.
    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Wraps a native pointer.
    #[must_use]
    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        Self(ptr as usize)
    }

    /// The opaque native value.
    #[must_use]
    pub const fn as_raw(self) -> usize {
        self.0
    }

    /// The native value as a pointer.
    #[must_use]
    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

/// Opaque token for a native callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeToken(pub usize);

/// Opaque token for a backend sensitivity process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessToken(pub usize);

/// Identifies which native API a backend wraps.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Vpi,
    Vhpi,
    Fli,
    Model,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vpi => "VPI",
            Self::Vhpi => "VHPI",
            Self::Fli => "FLI",
            Self::Model => "MODEL",
        })
    }
}

/// Simulator identification strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorInfo {
    /// Product name.
    pub product: String,
    /// Product version.
    pub version: String,
}

/// How a backend answers a lookup of an unindexed generate-loop name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerateLookup {
    /// Returns a native generate-array object.
    Native,
    /// Silently returns the first element (`loop[0]`).
    AliasFirst,
    /// Returns nothing.
    Fail,
}

/// Backend capabilities the core adapts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The native API can register a callback on a single signal. When false,
    /// value-change and phase callbacks are synthesized from a sensitivity process.
    pub per_signal_callbacks: bool,
    /// Behavior for unindexed generate names.
    pub generate_lookup: GenerateLookup,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            per_signal_callbacks: true,
            generate_lookup: GenerateLookup::Native,
        }
    }
}

/// Everything the core needs to know about a native object.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeInfo {
    /// Kind code.
    pub kind: NativeKind,
    /// Type descriptor.
    pub ty: TypeDesc,
    /// Short name, if the backend can produce one.
    pub name: Option<String>,
    /// Language world the object belongs to.
    pub language: Language,
    /// Bit width for packed composites, when known.
    pub size: Option<usize>,
}

/// One native callback registration.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeRequest {
    AfterDelay(u64),
    ValueChange(NativeRef),
    ReadWrite,
    ReadOnly,
    NextTimeStep,
    StartOfSimulation,
    EndOfSimulation,
}

impl NativeRequest {
    /// Reason code of this request.
    #[must_use]
    pub const fn reason(self) -> CallbackReason {
        match self {
            Self::AfterDelay(_) => CallbackReason::AfterDelay,
            Self::ValueChange(_) => CallbackReason::ValueChange,
            Self::ReadWrite => CallbackReason::ReadWrite,
            Self::ReadOnly => CallbackReason::ReadOnly,
            Self::NextTimeStep => CallbackReason::NextTimeStep,
            Self::StartOfSimulation => CallbackReason::StartOfSimulation,
            Self::EndOfSimulation => CallbackReason::EndOfSimulation,
        }
    }
}

fn unsupported_native(call: &'static str) -> GpiError {
    GpiError::native(call, "not provided by this backend")
}

/// Contract implemented once per native simulator API.
///
/// All methods take `&self`: the simulator re-enters the layer while backend
/// calls are still on the stack, so implementations keep their own bookkeeping
/// behind short-lived interior borrows.
pub trait Backend {
    /// Which native API this is.
    fn kind(&self) -> BackendKind;

    /// Language world of objects this backend considers native.
    fn language(&self) -> Language;

    /// Simulator identification.
    fn product(&self) -> SimulatorInfo;

    /// Capabilities and quirks.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Finds a top-level object, optionally by name.
    fn root(&self, name: Option<&str>) -> Option<NativeRef>;

    /// Finds a direct child of `parent` by its short name.
    fn lookup(&self, parent: NativeRef, name: &str) -> Option<NativeRef>;

    /// Finds the element at zero-based storage `offset` of an indexable object.
    fn element(&self, parent: NativeRef, offset: usize) -> Option<NativeRef>;

    /// Materializes every child of `parent` under one relationship kind.
    ///
    /// # Errors
    /// `Native` if the relationship cannot be enumerated for this parent.
    fn children(&self, parent: NativeRef, relation: Relation) -> GpiResult<Vec<NativeRef>>;

    /// Kind, type and name introspection.
    ///
    /// # Errors
    /// `Native` if the reference is not valid.
    fn describe(&self, native: NativeRef) -> GpiResult<NativeInfo>;

    /// Relationship kinds to visit, in priority order.
    fn relations(&self, object_type: ObjectType, selector: IterSelector) -> &'static [Relation] {
        default_relations(object_type, selector)
    }

    /// Releases a native reference through the API's documented release call.
    fn release(&self, _native: NativeRef) {}

    /// Reads the value as a bit-vector string.
    ///
    /// # Errors
    /// `Native` if the simulator rejects the read.
    fn get_binstr(&self, native: NativeRef) -> GpiResult<String>;

    /// Reads the value as raw bytes.
    ///
    /// # Errors
    /// `Native` if the simulator rejects the read.
    fn get_str(&self, native: NativeRef) -> GpiResult<Vec<u8>>;

    /// Reads the value as a real.
    ///
    /// # Errors
    /// `Native` if the simulator rejects the read.
    fn get_real(&self, native: NativeRef) -> GpiResult<f64>;

    /// Reads the value as an integer.
    ///
    /// # Errors
    /// `Native` if the simulator rejects the read.
    fn get_long(&self, native: NativeRef) -> GpiResult<i64>;

    /// Writes a value.
    ///
    /// # Errors
    /// `Native` if the simulator rejects the write.
    fn set_value(&self, native: NativeRef, value: &SignalValue, action: SetAction) -> GpiResult<()>;

    /// Registers a native callback carrying `user_data`.
    ///
    /// The pointer behind `user_data` stays valid until the registration is removed.
    ///
    /// # Errors
    /// `Native` if the registration fails.
    fn register_callback(&self, request: NativeRequest, user_data: &UserData) -> GpiResult<NativeToken>;

    /// Destroys a native registration.
    ///
    /// # Errors
    /// `Native` if the simulator refuses.
    fn remove_callback(&self, token: NativeToken) -> GpiResult<()>;

    /// Stops delivery of a recurring registration without destroying it.
    ///
    /// # Errors
    /// `Native` if the simulator refuses.
    fn desensitize(&self, _token: NativeToken) -> GpiResult<()> {
        Ok(())
    }

    /// Creates the execution context used to synthesize callbacks.
    ///
    /// # Errors
    /// `Native` unless the backend lacks per-signal callbacks.
    fn create_process(&self) -> GpiResult<ProcessToken> {
        Err(unsupported_native("create_process"))
    }

    /// Sensitizes `process` to a request, delivering `user_data` when it triggers.
    ///
    /// # Errors
    /// `Native` unless the backend lacks per-signal callbacks.
    fn sensitize(
        &self,
        _process: ProcessToken,
        _request: NativeRequest,
        _user_data: &UserData,
    ) -> GpiResult<NativeToken> {
        Err(unsupported_native("sensitize"))
    }

    /// Current simulation time in precision units.
    fn sim_time(&self) -> u64;

    /// Simulation precision as a power of ten seconds.
    fn sim_precision(&self) -> i32;

    /// Asks the simulator to finish.
    fn stop(&self);
}
