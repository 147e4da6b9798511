//! Scoped redirection of the process-wide standard streams.
//!
//! [`StreamRedirect`] points file descriptors 1 and 2 at an ensemble's
//! output and error files, and puts the previous targets back when restored
//! or dropped. Anything writing to the standard streams follows: `println!`,
//! C code, child processes spawned with inherited stdio.

use crate::error::{Error, Result};
use nix::unistd::{dup, dup2_stderr, dup2_stdout};
use std::fs::File;
use std::io::Write;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set while a redirect is installed; the standard streams are process-wide.
static REDIRECT_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Whether a [`StreamRedirect`] is currently installed in this process.
pub fn is_redirected() -> bool {
    REDIRECT_ACTIVE.load(Ordering::SeqCst)
}

/// Live redirection of stdout/stderr onto two files.
#[derive(Debug)]
pub struct StreamRedirect {
    saved_out: Option<OwnedFd>,
    saved_err: Option<OwnedFd>,
    live: bool,
}

impl StreamRedirect {
    /// Redirect stdout to `out` and stderr to `err`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceState`] if another redirect is already
    /// installed, and [`Error::Io`] if a descriptor cannot be duplicated.
    pub fn install(out: &File, err: &File) -> Result<Self> {
        if REDIRECT_ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(Error::ResourceState(
                "standard streams are already redirected in this process".into(),
            ));
        }

        let mut redirect = StreamRedirect {
            saved_out: None,
            saved_err: None,
            live: true,
        };
        // On failure `redirect` is dropped, which undoes whatever was done
        redirect.apply(out, err)?;
        Ok(redirect)
    }

    fn apply(&mut self, out: &File, err: &File) -> Result<()> {
        flush_std();
        self.saved_out = Some(dup(std::io::stdout()).map_err(|e| Error::io("<stdout>", e.into()))?);
        self.saved_err = Some(dup(std::io::stderr()).map_err(|e| Error::io("<stderr>", e.into()))?);
        dup2_stdout(out).map_err(|e| Error::io("<stdout>", e.into()))?;
        dup2_stderr(err).map_err(|e| Error::io("<stderr>", e.into()))?;
        Ok(())
    }

    /// Flush and put the previous stdout/stderr targets back.
    pub fn restore(mut self) -> Result<()> {
        self.undo()
    }

    fn undo(&mut self) -> Result<()> {
        if !self.live {
            return Ok(());
        }
        self.live = false;
        flush_std();
        let mut result = Ok(());
        if let Some(fd) = self.saved_out.take() {
            if let Err(e) = dup2_stdout(&fd) {
                result = Err(Error::io("<stdout>", e.into()));
            }
        }
        if let Some(fd) = self.saved_err.take() {
            if let Err(e) = dup2_stderr(&fd) {
                result = Err(Error::io("<stderr>", e.into()));
            }
        }
        REDIRECT_ACTIVE.store(false, Ordering::SeqCst);
        result
    }
}

impl Drop for StreamRedirect {
    fn drop(&mut self) {
        if let Err(e) = self.undo() {
            tracing::warn!(error = %e, "could not restore standard streams");
        }
    }
}

fn flush_std() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}
