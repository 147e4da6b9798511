//! Ensemble sessions: the `init` .. `finalize` lifecycle.
//!
//! A [`Session`] is created by a collective `init` over a parent group and
//! holds the rank's [`EnsembleContext`] until [`finalize`](Session::finalize).
//! There is no hidden global: pass the session to whatever needs the
//! ensemble's communicator or arguments.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "mpi")]
//! # fn main() -> ensembler::Result<()> {
//! use ensembler::{Mpi, Session};
//!
//! let mpi = Mpi::init()?;
//! let world = mpi.world();
//! let mut session = Session::init(std::env::args(), &world)?;
//!
//! // stdout/stderr now go to this ensemble's files
//! println!("running with {:?}", session.arguments()?);
//!
//! session.finalize()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "mpi"))]
//! # fn main() {}
//! ```

use crate::argv::{ArgVector, DEFAULT_PROGRAM_NAME};
use crate::config::EnsembleConfig;
use crate::context::{EnsembleContext, OutputFile, StreamMode};
use crate::error::{Error, Result};
use crate::group::ProcessGroup;
use crate::partition::{partition, report_fatal};
use std::path::{Path, PathBuf};

/// Options for [`Session`] initialization.
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    program_name: Option<String>,
    streams: StreamMode,
    lenient: bool,
}

impl SessionBuilder {
    /// Default options: process-wide redirection, validated configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the program name placed in slot 0 of the argument vector.
    pub fn program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = Some(name.into());
        self
    }

    /// Choose how the ensemble files are attached.
    pub fn streams(mut self, mode: StreamMode) -> Self {
        self.streams = mode;
        self
    }

    /// Skip range validation; overlapping descriptors then resolve to the first match.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Initialize from a program argument vector.
    ///
    /// `args[0]` is the program name and `args[1]` the configuration path;
    /// any further arguments are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if fewer than two arguments are
    /// given, before any collective call.
    pub fn init<G, I, S>(self, args: I, parent: &G) -> Result<Session<G>>
    where
        G: ProcessGroup,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let (program, path) = match (args.next(), args.next()) {
            (Some(program), Some(path)) => (program, path),
            _ => {
                let err = Error::Configuration(
                    "missing configuration path: pass the ensemble file as the first argument"
                        .into(),
                );
                report_fatal(&err);
                return Err(err);
            }
        };
        let program_name = self.program_name.clone().unwrap_or(program);
        self.run(&program_name, Path::new(&path), parent)
    }

    /// Initialize from a configuration file path.
    pub fn init_from_path<G: ProcessGroup>(
        self,
        path: impl AsRef<Path>,
        parent: &G,
    ) -> Result<Session<G>> {
        let program_name = self
            .program_name
            .clone()
            .unwrap_or_else(|| DEFAULT_PROGRAM_NAME.to_string());
        self.run(&program_name, path.as_ref(), parent)
    }

    /// Initialize from an already-decoded configuration.
    pub fn init_from_config<G: ProcessGroup>(
        self,
        config: EnsembleConfig,
        parent: &G,
    ) -> Result<Session<G>> {
        if !self.lenient {
            config.validate().map_err(fatal)?;
        }
        let program_name = self
            .program_name
            .clone()
            .unwrap_or_else(|| DEFAULT_PROGRAM_NAME.to_string());
        self.start(&program_name, config, None, parent)
    }

    fn run<G: ProcessGroup>(
        self,
        program_name: &str,
        path: &Path,
        parent: &G,
    ) -> Result<Session<G>> {
        // Decode fully before the first collective call
        let config = if self.lenient {
            EnsembleConfig::lenient_from_file(path)
        } else {
            EnsembleConfig::from_file(path)
        }
        .map_err(fatal)?;
        self.start(program_name, config, Some(path.to_path_buf()), parent)
    }

    fn start<G: ProcessGroup>(
        self,
        program_name: &str,
        config: EnsembleConfig,
        source: Option<PathBuf>,
        parent: &G,
    ) -> Result<Session<G>> {
        let rank = parent.rank().map_err(fatal)?;
        tracing::debug!(
            rank,
            ensembles = config.ensembles.len(),
            source = ?source,
            "partitioning parent group"
        );

        let state = match partition(parent, rank, &config.ensembles)? {
            Some(membership) => {
                let context =
                    EnsembleContext::open(membership, program_name, self.streams).map_err(fatal)?;
                tracing::info!(
                    rank,
                    ensemble = context.index(),
                    argv = ?context.argv(),
                    "joined ensemble"
                );
                State::Member(context)
            }
            None => State::Unassigned,
        };

        Ok(Session {
            rank,
            program_name: program_name.to_string(),
            state,
        })
    }
}

fn fatal(err: Error) -> Error {
    report_fatal(&err);
    err
}

enum State<G: ProcessGroup> {
    Member(EnsembleContext<G>),
    Unassigned,
    Finalized,
}

/// A rank's view of its ensemble between `init` and `finalize`.
pub struct Session<G: ProcessGroup> {
    rank: i32,
    program_name: String,
    state: State<G>,
}

impl<G: ProcessGroup> Session<G> {
    /// Collective initialization from the program's arguments.
    ///
    /// `args[1]` names the configuration file. Every rank of `parent` must
    /// call this. See [`SessionBuilder::init`].
    pub fn init<I, S>(args: I, parent: &G) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SessionBuilder::new().init(args, parent)
    }

    /// Collective initialization from a configuration file path.
    pub fn init_from_path(path: impl AsRef<Path>, parent: &G) -> Result<Self> {
        SessionBuilder::new().init_from_path(path, parent)
    }

    /// Restore the standard streams, close the ensemble files and release the sub-group.
    ///
    /// Valid exactly once; ranks outside every ensemble may call it too.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceState`] on a second call.
    pub fn finalize(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Finalized) {
            State::Member(context) => {
                let index = context.index();
                context.close()?;
                tracing::info!(rank = self.rank, ensemble = index, "ensemble finalized");
                Ok(())
            }
            State::Unassigned => Ok(()),
            State::Finalized => Err(Error::ResourceState(
                "finalize called on a session that is already finalized".into(),
            )),
        }
    }

    fn context(&self) -> Result<&EnsembleContext<G>> {
        match &self.state {
            State::Member(context) => Ok(context),
            State::Unassigned => Err(Error::NotMember { rank: self.rank }),
            State::Finalized => Err(Error::ResourceState(
                "session used after finalize".into(),
            )),
        }
    }

    fn context_mut(&mut self) -> Result<&mut EnsembleContext<G>> {
        match &mut self.state {
            State::Member(context) => Ok(context),
            State::Unassigned => Err(Error::NotMember { rank: self.rank }),
            State::Finalized => Err(Error::ResourceState(
                "session used after finalize".into(),
            )),
        }
    }

    /// The ensemble's sub-group.
    pub fn comm(&self) -> Result<&G> {
        Ok(self.context()?.group())
    }

    /// The ensemble's arguments, program name excluded.
    pub fn arguments(&self) -> Result<&[String]> {
        Ok(self.context()?.argv().arguments())
    }

    /// Number of arguments plus one for the program name.
    pub fn argc(&self) -> Result<usize> {
        Ok(self.context()?.argv().argc())
    }

    /// Full argument vector, program name in slot 0.
    pub fn argv(&self) -> Result<&ArgVector> {
        Ok(self.context()?.argv())
    }

    /// Position of this rank's ensemble in the configuration.
    pub fn ensemble_index(&self) -> Result<usize> {
        Ok(self.context()?.index())
    }

    /// Writer onto the ensemble's output file.
    pub fn stdout(&mut self) -> Result<&mut OutputFile> {
        Ok(self.context_mut()?.stdout())
    }

    /// Writer onto the ensemble's error file.
    pub fn stderr(&mut self) -> Result<&mut OutputFile> {
        Ok(self.context_mut()?.stderr())
    }

    /// This rank's rank in the parent group.
    pub fn parent_rank(&self) -> i32 {
        self.rank
    }

    /// Program name captured at init.
    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    /// Whether this rank joined an ensemble (and the session is not finalized).
    pub fn is_member(&self) -> bool {
        matches!(self.state, State::Member(_))
    }

    /// Whether [`finalize`](Self::finalize) has run.
    pub fn is_finalized(&self) -> bool {
        matches!(self.state, State::Finalized)
    }
}

impl<G: ProcessGroup> Drop for Session<G> {
    fn drop(&mut self) {
        if let State::Member(_) = self.state {
            tracing::warn!(rank = self.rank, "session dropped without finalize");
            if let Err(e) = self.finalize() {
                tracing::warn!(error = %e, "implicit finalize failed");
            }
        }
    }
}

impl<G: ProcessGroup> std::fmt::Debug for Session<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Session");
        s.field("rank", &self.rank);
        match &self.state {
            State::Member(context) => s.field("context", context),
            State::Unassigned => s.field("context", &"unassigned"),
            State::Finalized => s.field("context", &"finalized"),
        };
        s.finish()
    }
}
