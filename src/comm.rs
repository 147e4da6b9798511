//! Safe wrappers for the MPI communicator operations ensembles need.

use crate::error::{Error, Result};
use crate::ffi;
use crate::group::ProcessGroup;
use std::marker::PhantomData;

/// Handle value of `MPI_COMM_WORLD` in the shim's table.
const WORLD_HANDLE: i32 = 0;

/// An MPI communicator.
///
/// Sub-communicators returned by [`split`](Self::split) are freed when
/// dropped, or explicitly through [`ProcessGroup::release`]. The world
/// communicator is never freed.
///
/// # Example
///
/// ```no_run
/// use ensembler::Mpi;
///
/// let mpi = Mpi::init().unwrap();
/// let world = mpi.world();
///
/// println!("I am rank {} of {}", world.rank(), world.size());
/// ```
pub struct Communicator {
    handle: i32,
    /// Marker to prevent Send/Sync (MPI communicators are not thread-safe)
    _marker: PhantomData<*mut ()>,
}

impl Communicator {
    /// Color that opts the caller out of a split (`MPI_UNDEFINED`).
    pub fn undefined() -> i32 {
        unsafe { ffi::ensembler_undefined() }
    }

    /// Get a handle to `MPI_COMM_WORLD`.
    pub(crate) fn world() -> Self {
        Communicator {
            handle: unsafe { ffi::ensembler_comm_world() },
            _marker: PhantomData,
        }
    }

    /// Get the raw communicator handle (for advanced use).
    pub fn raw_handle(&self) -> i32 {
        self.handle
    }

    /// Get the rank of the calling process in this communicator.
    pub fn rank(&self) -> i32 {
        let mut rank: i32 = 0;
        unsafe { ffi::ensembler_comm_rank(self.handle, &mut rank) };
        rank
    }

    /// Get the number of processes in this communicator.
    pub fn size(&self) -> i32 {
        let mut size: i32 = 0;
        unsafe { ffi::ensembler_comm_size(self.handle, &mut size) };
        size
    }

    /// Split this communicator by `color`, ordering members by `key`.
    ///
    /// Collective over this communicator. Returns `None` for callers passing
    /// [`Communicator::undefined()`].
    pub fn split(&self, color: i32, key: i32) -> Result<Option<Communicator>> {
        let mut new_handle: i32 = -1;
        let ret = unsafe { ffi::ensembler_comm_split(self.handle, color, key, &mut new_handle) };
        check("split", ret)?;
        if new_handle < 0 {
            return Ok(None);
        }
        Ok(Some(Communicator {
            handle: new_handle,
            _marker: PhantomData,
        }))
    }

    /// Free this communicator now, reporting failures.
    pub fn free(mut self) -> Result<()> {
        let handle = std::mem::replace(&mut self.handle, WORLD_HANDLE);
        if handle == WORLD_HANDLE {
            return Ok(());
        }
        let ret = unsafe { ffi::ensembler_comm_free(handle) };
        check("release", ret)
    }
}

impl ProcessGroup for Communicator {
    fn rank(&self) -> Result<i32> {
        let mut rank: i32 = 0;
        let ret = unsafe { ffi::ensembler_comm_rank(self.handle, &mut rank) };
        check("rank", ret)?;
        Ok(rank)
    }

    fn size(&self) -> Result<i32> {
        let mut size: i32 = 0;
        let ret = unsafe { ffi::ensembler_comm_size(self.handle, &mut size) };
        check("size", ret)?;
        Ok(size)
    }

    fn split(&self, color: i32, key: i32) -> Result<Self> {
        Communicator::split(self, color, key)?
            .ok_or_else(|| Error::collective("split", "no communicator returned for a defined color"))
    }

    fn release(self) -> Result<()> {
        self.free()
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        // Don't free COMM_WORLD (handle 0)
        if self.handle != WORLD_HANDLE {
            unsafe { ffi::ensembler_comm_free(self.handle) };
        }
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("handle", &self.handle)
            .finish()
    }
}

/// Turn a non-zero return code into a collective error carrying MPI's own description.
fn check(operation: &'static str, code: i32) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(Error::collective(operation, error_string(code)))
    }
}

/// Human-readable description of an MPI (or shim) error code.
pub fn error_string(code: i32) -> String {
    let mut buf = [0u8; ffi::ERROR_STRING_LEN];
    let mut len: i32 = 0;
    let ret = unsafe { ffi::ensembler_error_string(code, buf.as_mut_ptr().cast(), &mut len) };
    if ret != 0 {
        return format!("MPI error code {code}");
    }
    let len = (len.max(0) as usize).min(buf.len());
    format!("{} (code {code})", String::from_utf8_lossy(&buf[..len]).trim_end())
}
