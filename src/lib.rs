//! # GPI - a Generic Procedural Interface between HDL simulators and a control program
//!
//! The layer sits between one event-driven hardware simulator and one reactive
//! control program (conventionally a scripting runtime). Whatever native API
//! the simulator exposes, callers see the same handle model, hierarchy
//! iterator, value accessors and callback state machine.
//!
//! ## Core Concepts
//!
//! - **Handle**: identity and classification of one simulation object
//! - **Backend**: one native simulator API behind the [`Backend`] trait
//! - **Pseudo-region**: the GENARRAY handle standing for an unindexed generate loop
//! - **Callback**: a reaction bound to a reason code, driven through FREE, PRIMED, CALL and DELETE
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gpi::{registry, Edge, GpiConfig, ModelDesign, ModelKernel, ModelObject, ModelOptions};
//!
//! let top = ModelObject::module("top").child(ModelObject::logic_vector("clk", 0, 0));
//! let kernel = ModelKernel::new(ModelDesign::new(vec![top]), ModelOptions::default())?;
//! let gpi = registry::install(Box::new(kernel.backend()), GpiConfig::default())?;
//!
//! let clk = gpi.get_handle_by_path("top.clk").expect("clk exists");
//! gpi.register_value_change(&clk, Edge::Rising, Box::new(|gpi, id| {
//!     println!("rising edge at {}", gpi.sim_time());
//!     let _ = gpi.rearm(id);
//! }))?;
//! kernel.start();
//! kernel.run_until(100);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core vocabulary
pub mod classify;
pub mod error;
pub mod logic;
pub mod types;

// Handles, hierarchy and values
pub mod handle;
pub mod hierarchy;
pub mod iterator;
pub mod value;

// Callbacks and backends
pub mod backend;
pub mod callback;
pub mod gpi;
pub mod registry;

// Ambient services
pub mod config;
pub mod events;
pub mod ffi;
pub mod logging;

pub use backend::{
    Backend, BackendKind, Capabilities, GenerateLookup, ModelBackend, ModelDesign, ModelKernel,
    ModelObject, ModelOptions, NativeInfo, NativeRef, NativeRequest, NativeToken, ProcessToken,
    SimulatorInfo,
};
pub use callback::{
    CallbackId, CallbackState, CallbackStats, ExecutionMode, Reaction, UserData, CALLBACK_MAGIC,
};
pub use classify::{classify, Classification, NativeKind, TypeDesc};
pub use config::GpiConfig;
pub use error::{GpiError, GpiResult};
pub use events::{EventStream, SimEvent};
pub use gpi::Gpi;
pub use handle::{Handle, ObjHandle};
pub use hierarchy::parse_indexed;
pub use iterator::{Children, GpiIterator, IterItem, IterSelector, Relation};
pub use logic::Logic;
pub use types::{
    CallbackReason, Edge, IndexRange, Language, ObjectType, RangeDirection, SetAction, ValueFormat,
};
pub use value::{Accessor, SignalValue};
