//! Thread-backed process groups.
//!
//! [`LocalWorld`] creates one [`LocalGroup`] handle per simulated rank; each
//! handle is meant to be moved onto its own thread. Splits are true
//! collectives: a call blocks until every member of the group has issued
//! its matching call, exactly like `MPI_Comm_split`.
//!
//! # Example
//!
//! ```
//! use ensembler::{LocalWorld, ProcessGroup};
//!
//! let handles = LocalWorld::new(4).unwrap().into_handles();
//! let threads: Vec<_> = handles
//!     .into_iter()
//!     .map(|world| {
//!         std::thread::spawn(move || {
//!             let rank = world.rank().unwrap();
//!             let half = world.split(rank / 2, rank).unwrap();
//!             half.members().to_vec()
//!         })
//!     })
//!     .collect();
//! let members: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
//! assert_eq!(members[3], vec![2, 3]);
//! ```

use crate::error::{Error, Result};
use crate::group::ProcessGroup;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Color that opts a member out of a split (it receives no group).
pub const UNDEFINED: i32 = -1;

/// Factory for a fresh set of thread-backed ranks.
pub struct LocalWorld {
    size: usize,
    faults: Faults,
}

/// Calls to fail on purpose, counted per rank (0-based).
#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    split_at: Option<usize>,
    release_at: Option<usize>,
}

impl LocalWorld {
    /// A world of `size` ranks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Configuration(
                "a local world needs at least one rank".into(),
            ));
        }
        Ok(LocalWorld {
            size,
            faults: Faults::default(),
        })
    }

    /// Make the `nth` split issued by each rank (0-based) fail on every rank.
    ///
    /// All ranks fail on the same call, so nobody is left blocked.
    pub fn fail_split_at(mut self, nth: usize) -> Self {
        self.faults.split_at = Some(nth);
        self
    }

    /// Make the `nth` release issued by each rank (0-based) fail.
    ///
    /// The handle is still consumed; only the reported outcome changes.
    pub fn fail_release_at(mut self, nth: usize) -> Self {
        self.faults.release_at = Some(nth);
        self
    }

    /// One handle per rank, indexed by rank.
    pub fn into_handles(self) -> Vec<LocalGroup> {
        let shared = Arc::new(Shared::new((0..self.size as i32).collect()));
        (0..self.size)
            .map(|rank| LocalGroup {
                shared: Arc::clone(&shared),
                rank: rank as i32,
                splits: Arc::new(AtomicUsize::new(0)),
                releases: Arc::new(AtomicUsize::new(0)),
                faults: self.faults,
            })
            .collect()
    }
}

/// A rank's handle on a thread-backed group.
pub struct LocalGroup {
    shared: Arc<Shared>,
    rank: i32,
    // Per-process counters, inherited by sub-groups so a rank's whole
    // history is visible from its world handle
    splits: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    faults: Faults,
}

impl LocalGroup {
    /// World ranks of this group's members, in group-rank order.
    pub fn members(&self) -> &[i32] {
        &self.shared.members
    }

    /// World rank of the calling member.
    pub fn world_rank(&self) -> i32 {
        self.shared.members[self.rank as usize]
    }

    /// Number of splits this process has issued, across all its groups.
    pub fn split_calls(&self) -> usize {
        self.splits.load(Ordering::SeqCst)
    }

    /// Number of handles this process has released, across all its groups.
    pub fn release_calls(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Split this group, returning `None` for members passing [`UNDEFINED`].
    pub fn split_optional(&self, color: i32, key: i32) -> Result<Option<LocalGroup>> {
        let issued = self.splits.fetch_add(1, Ordering::SeqCst);
        if self.faults.split_at == Some(issued) {
            return Err(Error::collective(
                "split",
                format!("injected failure on split call {issued}"),
            ));
        }
        if color < 0 && color != UNDEFINED {
            return Err(Error::collective(
                "split",
                format!("invalid color {color}"),
            ));
        }

        let placement = self.shared.rendezvous(self.rank, color, key)?;
        Ok(placement.map(|(shared, rank)| LocalGroup {
            shared,
            rank,
            splits: Arc::clone(&self.splits),
            releases: Arc::clone(&self.releases),
            faults: self.faults,
        }))
    }
}

impl ProcessGroup for LocalGroup {
    fn rank(&self) -> Result<i32> {
        Ok(self.rank)
    }

    fn size(&self) -> Result<i32> {
        Ok(self.shared.members.len() as i32)
    }

    fn split(&self, color: i32, key: i32) -> Result<Self> {
        self.split_optional(color, key)?.ok_or_else(|| {
            Error::collective("split", "member passed UNDEFINED color and got no group")
        })
    }

    fn release(self) -> Result<()> {
        let issued = self.releases.fetch_add(1, Ordering::SeqCst);
        if self.faults.release_at == Some(issued) {
            return Err(Error::collective(
                "release",
                format!("injected failure on release call {issued}"),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for LocalGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalGroup")
            .field("rank", &self.rank)
            .field("members", &self.shared.members)
            .finish()
    }
}

type Placement = Option<(Arc<Shared>, i32)>;

/// State shared by every member of one group.
struct Shared {
    members: Vec<i32>,
    round: Mutex<Round>,
    turn: Condvar,
}

/// One in-flight split: filled by arrivals, drained by departures.
struct Round {
    requests: Vec<Option<(i32, i32)>>,
    arrived: usize,
    outcome: Option<Vec<Placement>>,
    departed: usize,
}

impl Shared {
    fn new(members: Vec<i32>) -> Self {
        let n = members.len();
        Shared {
            members,
            round: Mutex::new(Round {
                requests: vec![None; n],
                arrived: 0,
                outcome: None,
                departed: 0,
            }),
            turn: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Round>> {
        self.round
            .lock()
            .map_err(|_| Error::collective("split", "a peer panicked during a collective"))
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Round>) -> Result<MutexGuard<'a, Round>> {
        self.turn
            .wait(guard)
            .map_err(|_| Error::collective("split", "a peer panicked during a collective"))
    }

    fn rendezvous(&self, rank: i32, color: i32, key: i32) -> Result<Placement> {
        let n = self.members.len();
        let mut round = self.lock()?;

        // A previous split is still being collected by slower members
        while round.outcome.is_some() {
            round = self.wait(round)?;
        }

        round.requests[rank as usize] = Some((color, key));
        round.arrived += 1;
        if round.arrived == n {
            let outcome = self.assign(&round.requests);
            round.outcome = Some(outcome);
            self.turn.notify_all();
        }

        while round.outcome.is_none() {
            round = self.wait(round)?;
        }

        let placement = round
            .outcome
            .as_mut()
            .and_then(|outcome| outcome[rank as usize].take());
        round.departed += 1;
        if round.departed == n {
            round.requests.iter_mut().for_each(|r| *r = None);
            round.arrived = 0;
            round.departed = 0;
            round.outcome = None;
            self.turn.notify_all();
        }
        Ok(placement)
    }

    /// Build the new groups once every member has arrived.
    fn assign(&self, requests: &[Option<(i32, i32)>]) -> Vec<Placement> {
        let mut by_color: BTreeMap<i32, Vec<(i32, usize)>> = BTreeMap::new();
        for (rank, request) in requests.iter().enumerate() {
            if let Some((color, key)) = *request {
                if color != UNDEFINED {
                    by_color.entry(color).or_default().push((key, rank));
                }
            }
        }

        let mut outcome: Vec<Placement> = vec![None; requests.len()];
        for mut entries in by_color.into_values() {
            entries.sort_unstable();
            let members = entries.iter().map(|&(_, r)| self.members[r]).collect();
            let group = Arc::new(Shared::new(members));
            for (new_rank, &(_, old_rank)) in entries.iter().enumerate() {
                outcome[old_rank] = Some((Arc::clone(&group), new_rank as i32));
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn run<T, F>(size: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(LocalGroup) -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let threads: Vec<_> = LocalWorld::new(size)
            .unwrap()
            .into_handles()
            .into_iter()
            .map(|g| {
                let f = Arc::clone(&f);
                thread::spawn(move || f(g))
            })
            .collect();
        threads.into_iter().map(|t| t.join().unwrap()).collect()
    }

    #[test]
    fn even_odd_split_preserves_order() {
        let out = run(6, |world| {
            let rank = world.rank().unwrap();
            let sub = world.split(rank % 2, rank).unwrap();
            (sub.rank().unwrap(), sub.members().to_vec())
        });
        for (rank, (sub_rank, members)) in out.iter().enumerate() {
            assert_eq!(*sub_rank, rank as i32 / 2);
            let expected: Vec<i32> = (0..6).filter(|r| r % 2 == rank as i32 % 2).collect();
            assert_eq!(members, &expected);
        }
    }

    #[test]
    fn key_reorders_members() {
        let out = run(4, |world| {
            let rank = world.rank().unwrap();
            let sub = world.split(0, -rank).unwrap();
            (sub.rank().unwrap(), sub.members().to_vec())
        });
        assert_eq!(out[0].0, 3);
        assert_eq!(out[3].0, 0);
        assert_eq!(out[0].1, vec![3, 2, 1, 0]);
    }

    #[test]
    fn repeated_splits_stay_in_lockstep() {
        let out = run(5, |world| {
            let rank = world.rank().unwrap();
            let mut sizes = Vec::new();
            for round in 0..20 {
                let sub = world.split((rank + round) % 3, rank).unwrap();
                sizes.push(sub.size().unwrap());
                sub.release().unwrap();
            }
            (sizes, world.split_calls(), world.release_calls())
        });
        for (_, splits, releases) in &out {
            assert_eq!(*splits, 20);
            assert_eq!(*releases, 20);
        }
        for round in 0..20 {
            for rank in 0..5 {
                let color = (rank + round) % 3;
                let expected = (0..5).filter(|r| (r + round) % 3 == color).count() as i32;
                assert_eq!(out[rank].0[round], expected, "rank {rank} round {round}");
            }
        }
    }

    #[test]
    fn nested_split_of_a_sub_group() {
        let out = run(8, |world| {
            let rank = world.rank().unwrap();
            let half = world.split(rank / 4, rank).unwrap();
            let quarter = half.split(half.rank().unwrap() / 2, 0).unwrap();
            (quarter.members().to_vec(), quarter.world_rank(), world.split_calls())
        });
        assert_eq!(out[5].0, vec![4, 5]);
        assert_eq!(out[5].1, 5);
        assert_eq!(out[6].0, vec![6, 7]);
        assert!(out.iter().all(|o| o.2 == 2));
    }

    #[test]
    fn undefined_color_gets_no_group() {
        let out = run(3, |world| {
            let rank = world.rank().unwrap();
            let color = if rank == 0 { UNDEFINED } else { 7 };
            world
                .split_optional(color, rank)
                .unwrap()
                .map(|g| g.members().to_vec())
        });
        assert_eq!(out[0], None);
        assert_eq!(out[1], Some(vec![1, 2]));
    }

    #[test]
    fn injected_failure_hits_every_rank() {
        let handles = LocalWorld::new(3).unwrap().fail_split_at(1).into_handles();
        let threads: Vec<_> = handles
            .into_iter()
            .map(|world| {
                thread::spawn(move || {
                    let first = world.split(0, 0).map(|_| ());
                    let second = world.split(0, 0).map(|_| ());
                    (first.is_ok(), second.is_err())
                })
            })
            .collect();
        for t in threads {
            assert_eq!(t.join().unwrap(), (true, true));
        }
    }

    #[test]
    fn injected_release_failure_still_counts_the_call() {
        let world = LocalWorld::new(1)
            .unwrap()
            .fail_release_at(1)
            .into_handles()
            .remove(0);
        assert!(world.split(0, 0).unwrap().release().is_ok());
        let err = world.split(0, 0).unwrap().release().unwrap_err();
        assert!(matches!(err, Error::Collective { operation: "release", .. }));
        assert!(world.split(0, 0).unwrap().release().is_ok());
        assert_eq!(world.release_calls(), 3);
    }

    #[test]
    fn empty_world_is_rejected() {
        assert!(matches!(LocalWorld::new(0), Err(Error::Configuration(_))));
    }
}
