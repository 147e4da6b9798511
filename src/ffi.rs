//! Raw FFI bindings to the communicator shim in `csrc/ensembler_mpi.c`.
//!
//! These are low-level unsafe functions. Use [`Mpi`](crate::Mpi) and
//! [`Communicator`](crate::Communicator) instead.

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_int};

pub type int32_t = i32;

/// Size of the buffer handed to `ensembler_error_string`; at least `MPI_MAX_ERROR_STRING`.
pub const ERROR_STRING_LEN: usize = 1024;

extern "C" {
    // ============================================================
    // Initialization and Finalization
    // ============================================================

    pub fn ensembler_init() -> c_int;
    pub fn ensembler_finalize() -> c_int;
    pub fn ensembler_initialized(flag: *mut c_int) -> c_int;
    pub fn ensembler_finalized(flag: *mut c_int) -> c_int;

    // ============================================================
    // Communicator Operations
    // ============================================================

    pub fn ensembler_comm_world() -> int32_t;
    pub fn ensembler_comm_rank(comm: int32_t, rank: *mut int32_t) -> c_int;
    pub fn ensembler_comm_size(comm: int32_t, size: *mut int32_t) -> c_int;
    pub fn ensembler_comm_split(
        comm: int32_t,
        color: int32_t,
        key: int32_t,
        newcomm: *mut int32_t,
    ) -> c_int;
    pub fn ensembler_comm_free(comm: int32_t) -> c_int;
    pub fn ensembler_undefined() -> int32_t;

    // ============================================================
    // Error Information
    // ============================================================

    pub fn ensembler_error_string(code: c_int, message: *mut c_char, len: *mut int32_t) -> c_int;
}
