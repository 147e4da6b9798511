//! # ensembler
//!
//! Run one parallel job as many independent ensembles.
//!
//! A single `mpiexec` launch is carved into contiguous rank ranges. Each
//! range gets its own communicator, its own command-line arguments and its
//! own stdout/stderr files, so every ensemble behaves as if it had been
//! launched separately with different arguments.
//!
//! ## Configuration
//!
//! ```yaml
//! ensembles:
//!   #  first, last, arguments,          stdout,     stderr
//!   - [0,     3,    ["--mode", "fast"], "fast.out", "fast.err"]
//!   - [4,     7,    ["--mode", "slow"], "slow.out", "slow.err"]
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "mpi")]
//! # fn main() -> Result<(), ensembler::Error> {
//! use ensembler::Mpi;
//!
//! let mpi = Mpi::init()?;
//!
//! // mpiexec -n 8 ./app ensembles.yaml
//! let mut session = mpi.session(std::env::args())?;
//!
//! let comm = session.comm()?;
//! println!("rank {} of my ensemble, argv = {:?}", comm.rank(), session.argv()?);
//!
//! session.finalize()?;
//! Ok(())
//! # }
//! # #[cfg(not(feature = "mpi"))]
//! # fn main() {}
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `mpi`   | MPI backend ([`Mpi`], `Communicator`) | system MPI, found by `build.rs` |
//!
//! Without `mpi`, [`LocalWorld`] provides thread-backed process groups with
//! the same collective semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

mod argv;
mod config;
mod context;
mod descriptor;
mod error;
mod group;
mod local;
mod partition;
mod redirect;
mod session;

#[cfg(feature = "mpi")]
mod comm;
#[cfg(feature = "mpi")]
mod ffi;
#[cfg(feature = "mpi")]
mod mpi;

pub use argv::{ArgVector, DEFAULT_PROGRAM_NAME};
pub use config::{ConfigFormat, EnsembleConfig};
pub use context::{EnsembleContext, OutputFile, StreamMode};
pub use descriptor::{EnsembleDescriptor, DESCRIPTOR_FIELDS};
pub use error::{Error, Result};
pub use group::{ProcessGroup, SplitTag};
pub use local::{LocalGroup, LocalWorld, UNDEFINED};
pub use partition::{assign, partition, Membership};
pub use redirect::{is_redirected, StreamRedirect};
pub use session::{Session, SessionBuilder};

#[cfg(feature = "mpi")]
pub use comm::{error_string, Communicator};
#[cfg(feature = "mpi")]
pub use mpi::Mpi;
