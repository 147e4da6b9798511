//! Per-rank ensemble state produced by a successful partition.

use crate::argv::ArgVector;
use crate::error::{Error, Result};
use crate::group::ProcessGroup;
use crate::partition::Membership;
use crate::redirect::StreamRedirect;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// How an ensemble's output files are attached to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Redirect the process-wide stdout/stderr onto the ensemble files
    #[default]
    Redirect,
    /// Only open the files; write through [`Session::stdout`](crate::Session::stdout)
    /// and [`Session::stderr`](crate::Session::stderr). For several ranks
    /// sharing one OS process.
    Detached,
}

/// Everything a rank owns once it has joined an ensemble.
pub struct EnsembleContext<G: ProcessGroup> {
    // Dropped before the files it points at
    redirect: Option<StreamRedirect>,
    group: G,
    index: usize,
    argv: ArgVector,
    out: OutputFile,
    err: OutputFile,
}

impl<G: ProcessGroup> EnsembleContext<G> {
    /// Take ownership of a membership, open its files and attach them.
    ///
    /// On failure the sub-group is released before the error is returned.
    pub(crate) fn open(
        membership: Membership<G>,
        program_name: &str,
        mode: StreamMode,
    ) -> Result<Self> {
        let Membership {
            group,
            index,
            descriptor,
        } = membership;

        let attached = ArgVector::new(program_name, &descriptor.arguments).and_then(|argv| {
            let out = OutputFile::create(&descriptor.output_path)?;
            let err = OutputFile::create(&descriptor.error_path)?;
            let redirect = match mode {
                StreamMode::Redirect => Some(StreamRedirect::install(&out.file, &err.file)?),
                StreamMode::Detached => None,
            };
            Ok((argv, out, err, redirect))
        });

        match attached {
            Ok((argv, out, err, redirect)) => Ok(EnsembleContext {
                redirect,
                group,
                index,
                argv,
                out,
                err,
            }),
            Err(e) => {
                if let Err(release_err) = group.release() {
                    tracing::warn!(error = %release_err, "could not release sub-group");
                }
                Err(e)
            }
        }
    }

    /// The ensemble's sub-group.
    pub fn group(&self) -> &G {
        &self.group
    }

    /// Position of the ensemble in the configuration.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The ensemble's argument vector.
    pub fn argv(&self) -> &ArgVector {
        &self.argv
    }

    /// Writer onto the ensemble's output file.
    pub fn stdout(&mut self) -> &mut OutputFile {
        &mut self.out
    }

    /// Writer onto the ensemble's error file.
    pub fn stderr(&mut self) -> &mut OutputFile {
        &mut self.err
    }

    /// Whether the process-wide streams currently point at this ensemble.
    pub fn is_redirected(&self) -> bool {
        self.redirect.is_some()
    }

    /// Restore streams, flush and close files, release the sub-group.
    ///
    /// Every step is attempted; the first failure is returned.
    pub(crate) fn close(self) -> Result<()> {
        let EnsembleContext {
            group,
            redirect,
            out,
            err,
            ..
        } = self;

        let mut first: Option<Error> = None;
        if let Some(redirect) = redirect {
            if let Err(e) = redirect.restore() {
                first.get_or_insert(e);
            }
        }
        for file in [out, err] {
            if let Err(e) = file.close() {
                first.get_or_insert(e);
            }
        }
        if let Err(e) = group.release() {
            first.get_or_insert(e);
        }

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<G: ProcessGroup> std::fmt::Debug for EnsembleContext<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleContext")
            .field("index", &self.index)
            .field("argv", &self.argv)
            .field("out", &self.out.path)
            .field("err", &self.err.path)
            .field("redirected", &self.redirect.is_some())
            .finish()
    }
}

/// A truncated-on-open file owned by an ensemble context.
#[derive(Debug)]
pub struct OutputFile {
    path: PathBuf,
    file: File,
}

impl OutputFile {
    fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;
        Ok(OutputFile {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path the file was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn close(mut self) -> Result<()> {
        self.file.flush().map_err(|e| Error::io(&self.path, e))
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}
