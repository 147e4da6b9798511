//! The process-group contract the partitioner is written against.
//!
//! Only three primitives are needed: the caller's rank, a collective
//! split by color, and releasing a handle. [`LocalGroup`](crate::LocalGroup)
//! implements them with threads, `Communicator` (feature `mpi`) with MPI.

use crate::error::Result;

/// A set of processes that can coordinate through collective calls.
pub trait ProcessGroup: Sized {
    /// Rank of the calling process in this group.
    fn rank(&self) -> Result<i32>;

    /// Number of processes in this group.
    fn size(&self) -> Result<i32>;

    /// Collectively split this group by `color`.
    ///
    /// Every member must call this the same number of times in the same
    /// order. Members passing the same color end up in the same new group,
    /// ordered by `key` (ties broken by rank in this group).
    fn split(&self, color: i32, key: i32) -> Result<Self>;

    /// Release a handle obtained from [`split`](Self::split).
    fn release(self) -> Result<()>;
}

/// Color passed to [`ProcessGroup::split`] during partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SplitTag {
    /// The caller is not a member of the descriptor being split on
    Inactive = 0,
    /// The caller belongs to the descriptor being split on
    Active = 1,
}

impl SplitTag {
    /// Tag for a membership test result.
    pub fn from_active(active: bool) -> Self {
        if active {
            SplitTag::Active
        } else {
            SplitTag::Inactive
        }
    }

    /// The integer color handed to the substrate.
    pub fn color(self) -> i32 {
        self as i32
    }
}
