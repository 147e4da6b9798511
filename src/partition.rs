//! Partitioning a parent group into ensembles.
//!
//! Splitting is collective, so every rank walks the *whole* descriptor list
//! and issues exactly one split per descriptor, in list order, whether or
//! not it has already found its ensemble. A rank that already matched votes
//! [`SplitTag::Inactive`] on every later descriptor.

use crate::descriptor::EnsembleDescriptor;
use crate::error::{Error, Result};
use crate::group::{ProcessGroup, SplitTag};
use std::io::Write;

/// The outcome of partitioning for a rank that matched a descriptor.
#[derive(Debug)]
pub struct Membership<G> {
    /// Sub-group made of every rank of the matched descriptor
    pub group: G,
    /// Position of the matched descriptor in the list
    pub index: usize,
    /// Copy of the matched descriptor
    pub descriptor: EnsembleDescriptor,
}

/// Index of the first descriptor containing `rank`, without any collective call.
pub fn assign(rank: i32, descriptors: &[EnsembleDescriptor]) -> Option<usize> {
    descriptors.iter().position(|d| d.contains(rank))
}

/// Split `parent` once per descriptor and keep the sub-group this rank belongs to.
///
/// `rank` is the caller's rank in `parent` and doubles as the ordering key,
/// so sub-group ranks follow parent ranks. Returns `Ok(None)` when no
/// descriptor contains `rank`.
///
/// # Errors
///
/// Returns [`Error::Collective`] if a split or release fails. The failure is
/// also written to both stdout and stderr before returning.
pub fn partition<G: ProcessGroup>(
    parent: &G,
    rank: i32,
    descriptors: &[EnsembleDescriptor],
) -> Result<Option<Membership<G>>> {
    let mut matched: Option<Membership<G>> = None;

    for (index, descriptor) in descriptors.iter().enumerate() {
        let tag = SplitTag::from_active(matched.is_none() && descriptor.contains(rank));
        tracing::debug!(rank, index, ?tag, "splitting parent group");

        let group = match parent.split(tag.color(), rank) {
            Ok(group) => group,
            Err(err) => return Err(abort(err, matched)),
        };

        match tag {
            SplitTag::Active => {
                tracing::debug!(rank, index, "rank matched ensemble");
                matched = Some(Membership {
                    group,
                    index,
                    descriptor: descriptor.clone(),
                });
            }
            SplitTag::Inactive => {
                if let Err(err) = group.release() {
                    return Err(abort(err, matched));
                }
            }
        }
    }

    if matched.is_none() {
        tracing::warn!(rank, ensembles = descriptors.len(), "rank is not in any ensemble");
    }
    Ok(matched)
}

/// Release whatever was already matched, then surface the failure.
fn abort<G: ProcessGroup>(err: Error, matched: Option<Membership<G>>) -> Error {
    if let Some(m) = matched {
        if let Err(release_err) = m.group.release() {
            tracing::warn!(error = %release_err, "could not release sub-group while aborting");
        }
    }
    report_fatal(&err);
    err
}

/// Write a fatal error to both standard streams and flush them.
///
/// Both streams may already point at ensemble files, so the message lands
/// wherever the rank's output is currently going.
pub(crate) fn report_fatal(err: &Error) {
    tracing::error!(kind = err.kind(), error = %err, "ensemble initialization aborted");
    let message = format!("{}: {err}", err.kind());

    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{message}");
    let _ = out.flush();
    let mut errs = std::io::stderr().lock();
    let _ = writeln!(errs, "{message}");
    let _ = errs.flush();
}
