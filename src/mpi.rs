//! The MPI environment handle.

use crate::comm::{self, Communicator};
use crate::error::{Error, Result};
use crate::ffi;
use crate::session::{Session, SessionBuilder};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag tracking whether MPI has been initialized
static MPI_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// MPI environment handle.
///
/// There can only be one instance at a time. When dropped, it finalizes MPI,
/// so finalize every [`Session`](crate::Session) first.
///
/// # Example
///
/// ```no_run
/// use ensembler::Mpi;
///
/// let mpi = Mpi::init().expect("Failed to initialize MPI");
/// let world = mpi.world();
/// println!("Running on {} processes", world.size());
/// // MPI is finalized when `mpi` goes out of scope
/// ```
pub struct Mpi {
    /// Marker to make Mpi !Send and !Sync
    _marker: PhantomData<*const ()>,
}

impl Mpi {
    /// Initialize MPI.
    ///
    /// # Errors
    ///
    /// Returns an error if MPI is already initialized or if initialization fails.
    pub fn init() -> Result<Self> {
        if MPI_INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(Error::ResourceState("MPI has already been initialized".into()));
        }

        let ret = unsafe { ffi::ensembler_init() };
        if ret != 0 {
            MPI_INITIALIZED.store(false, Ordering::SeqCst);
            return Err(Error::collective("init", comm::error_string(ret)));
        }

        tracing::debug!(library = ?Self::library_version(), "MPI initialized");
        Ok(Mpi {
            _marker: PhantomData,
        })
    }

    /// Get a handle to `MPI_COMM_WORLD`.
    pub fn world(&self) -> Communicator {
        Communicator::world()
    }

    /// Partition `MPI_COMM_WORLD` using the configuration named by `args[1]`.
    ///
    /// Collective over every process. Equivalent to
    /// `Session::init(args, &mpi.world())`.
    pub fn session<I, S>(&self, args: I) -> Result<Session<Communicator>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SessionBuilder::new().init(args, &self.world())
    }

    /// Partition `MPI_COMM_WORLD` using the configuration file at `path`.
    pub fn session_from_path(&self, path: impl AsRef<Path>) -> Result<Session<Communicator>> {
        SessionBuilder::new().init_from_path(path, &self.world())
    }

    /// Version of the MPI library found at build time, when pkg-config reported one.
    pub fn library_version() -> Option<&'static str> {
        option_env!("ENSEMBLER_MPI_VERSION")
    }

    /// Check if MPI has been initialized.
    pub fn is_initialized() -> bool {
        let mut flag: i32 = 0;
        unsafe { ffi::ensembler_initialized(&mut flag) };
        flag != 0
    }

    /// Check if MPI has been finalized.
    pub fn is_finalized() -> bool {
        let mut flag: i32 = 0;
        unsafe { ffi::ensembler_finalized(&mut flag) };
        flag != 0
    }
}

impl Drop for Mpi {
    fn drop(&mut self) {
        if MPI_INITIALIZED.load(Ordering::SeqCst) {
            unsafe {
                ffi::ensembler_finalize();
            }
            MPI_INITIALIZED.store(false, Ordering::SeqCst);
        }
    }
}
