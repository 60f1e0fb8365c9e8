//! Raw VPI declarations (IEEE 1800 `vpi_user.h`).
//!
//! Symbols are resolved against the simulator when it loads the library.

#![allow(non_camel_case_types, non_upper_case_globals, missing_docs, dead_code)]

use std::ffi::{c_char, c_double};

pub type PLI_INT32 = i32;
pub type PLI_UINT32 = u32;
pub type PLI_BYTE8 = c_char;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct vpi_object {
    _unused: [u8; 0],
}
pub type vpiHandle = *mut vpi_object;

// Object types.
pub const vpiIntegerVar: PLI_INT32 = 25;
pub const vpiMemory: PLI_INT32 = 29;
pub const vpiMemoryWord: PLI_INT32 = 30;
pub const vpiModule: PLI_INT32 = 32;
pub const vpiNet: PLI_INT32 = 36;
pub const vpiParameter: PLI_INT32 = 41;
pub const vpiRealVar: PLI_INT32 = 47;
pub const vpiReg: PLI_INT32 = 48;
pub const vpiNetArray: PLI_INT32 = 114;
pub const vpiRegArray: PLI_INT32 = 116;
pub const vpiGenScopeArray: PLI_INT32 = 133;
pub const vpiGenScope: PLI_INT32 = 134;
pub const vpiPackage: PLI_INT32 = 600;
pub const vpiLongIntVar: PLI_INT32 = 610;
pub const vpiShortIntVar: PLI_INT32 = 611;
pub const vpiIntVar: PLI_INT32 = 612;
pub const vpiByteVar: PLI_INT32 = 614;
pub const vpiStringVar: PLI_INT32 = 616;
pub const vpiEnumVar: PLI_INT32 = 617;
pub const vpiStructVar: PLI_INT32 = 618;
pub const vpiBitVar: PLI_INT32 = 620;
pub const vpiEnumNet: PLI_INT32 = 680;
pub const vpiStructNet: PLI_INT32 = 683;

// One-to-many relations.
pub const vpiLeftRange: PLI_INT32 = 79;
pub const vpiRightRange: PLI_INT32 = 83;
pub const vpiDriver: PLI_INT32 = 90;
pub const vpiLoad: PLI_INT32 = 91;
pub const vpiInternalScope: PLI_INT32 = 92;
pub const vpiVariables: PLI_INT32 = 100;
pub const vpiMember: PLI_INT32 = 742;

// Properties.
pub const vpiType: PLI_INT32 = 1;
pub const vpiName: PLI_INT32 = 2;
pub const vpiFullName: PLI_INT32 = 3;
pub const vpiSize: PLI_INT32 = 4;
pub const vpiTimePrecision: PLI_INT32 = 12;
pub const vpiVector: PLI_INT32 = 18;
pub const vpiPacked: PLI_INT32 = 630;

// Value formats.
pub const vpiBinStrVal: PLI_INT32 = 1;
pub const vpiIntVal: PLI_INT32 = 6;
pub const vpiRealVal: PLI_INT32 = 7;
pub const vpiStringVal: PLI_INT32 = 8;
pub const vpiSuppressVal: PLI_INT32 = 13;

// vpi_put_value flags.
pub const vpiNoDelay: PLI_INT32 = 1;
pub const vpiInertialDelay: PLI_INT32 = 2;
pub const vpiForceFlag: PLI_INT32 = 5;
pub const vpiReleaseFlag: PLI_INT32 = 6;

// Time types.
pub const vpiSimTime: PLI_INT32 = 2;
pub const vpiSuppressTime: PLI_INT32 = 3;

// Callback reasons.
pub const cbValueChange: PLI_INT32 = 1;
pub const cbReadWriteSynch: PLI_INT32 = 6;
pub const cbReadOnlySynch: PLI_INT32 = 7;
pub const cbNextSimTime: PLI_INT32 = 8;
pub const cbAfterDelay: PLI_INT32 = 9;
pub const cbStartOfSimulation: PLI_INT32 = 11;
pub const cbEndOfSimulation: PLI_INT32 = 12;

// vpi_control operations.
pub const vpiFinish: PLI_INT32 = 67;

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct s_vpi_time {
    pub type_: PLI_INT32,
    pub high: PLI_UINT32,
    pub low: PLI_UINT32,
    pub real: c_double,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union t_vpi_value_union {
    pub str_: *mut PLI_BYTE8,
    pub scalar: PLI_INT32,
    pub integer: PLI_INT32,
    pub real: c_double,
    pub time: *mut s_vpi_time,
    pub misc: *mut PLI_BYTE8,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct s_vpi_value {
    pub format: PLI_INT32,
    pub value: t_vpi_value_union,
}

impl s_vpi_value {
    pub const fn with_format(format: PLI_INT32) -> Self {
        Self {
            format,
            value: t_vpi_value_union { integer: 0 },
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct s_cb_data {
    pub reason: PLI_INT32,
    pub cb_rtn: Option<unsafe extern "C" fn(*mut s_cb_data) -> PLI_INT32>,
    pub obj: vpiHandle,
    pub time: *mut s_vpi_time,
    pub value: *mut s_vpi_value,
    pub index: PLI_INT32,
    pub user_data: *mut PLI_BYTE8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct s_vpi_vlog_info {
    pub argc: PLI_INT32,
    pub argv: *mut *mut PLI_BYTE8,
    pub product: *mut PLI_BYTE8,
    pub version: *mut PLI_BYTE8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct s_vpi_error_info {
    pub state: PLI_INT32,
    pub level: PLI_INT32,
    pub message: *mut PLI_BYTE8,
    pub product: *mut PLI_BYTE8,
    pub code: *mut PLI_BYTE8,
    pub file: *mut PLI_BYTE8,
    pub line: PLI_INT32,
}

extern "C" {
    pub fn vpi_handle_by_name(name: *mut PLI_BYTE8, scope: vpiHandle) -> vpiHandle;
    pub fn vpi_handle_by_index(object: vpiHandle, index: PLI_INT32) -> vpiHandle;
    pub fn vpi_handle(relation: PLI_INT32, object: vpiHandle) -> vpiHandle;
    pub fn vpi_iterate(relation: PLI_INT32, object: vpiHandle) -> vpiHandle;
    pub fn vpi_scan(iterator: vpiHandle) -> vpiHandle;
    pub fn vpi_get(property: PLI_INT32, object: vpiHandle) -> PLI_INT32;
    pub fn vpi_get_str(property: PLI_INT32, object: vpiHandle) -> *mut PLI_BYTE8;
    pub fn vpi_get_value(object: vpiHandle, value: *mut s_vpi_value);
    pub fn vpi_put_value(
        object: vpiHandle,
        value: *mut s_vpi_value,
        time: *mut s_vpi_time,
        flags: PLI_INT32,
    ) -> vpiHandle;
    pub fn vpi_get_time(object: vpiHandle, time: *mut s_vpi_time);
    pub fn vpi_register_cb(data: *mut s_cb_data) -> vpiHandle;
    pub fn vpi_remove_cb(callback: vpiHandle) -> PLI_INT32;
    pub fn vpi_release_handle(object: vpiHandle) -> PLI_INT32;
    pub fn vpi_get_vlog_info(info: *mut s_vpi_vlog_info) -> PLI_INT32;
    pub fn vpi_chk_error(info: *mut s_vpi_error_info) -> PLI_INT32;
    pub fn vpi_control(operation: PLI_INT32, ...) -> PLI_INT32;
}

pub type StartupRoutine = Option<unsafe extern "C" fn()>;
