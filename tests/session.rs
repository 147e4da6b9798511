//! Session lifecycle over thread-backed ranks.
//!
//! Every rank runs on its own thread, so streams stay detached: the
//! process-wide redirect is covered separately in `tests/redirect.rs`.

use ensembler::{
    EnsembleConfig, EnsembleDescriptor, Error, LocalGroup, LocalWorld, ProcessGroup, Session,
    SessionBuilder, StreamMode,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// Run `f` once per rank, each on its own thread, and collect the results by rank.
fn on_every_rank<T, F>(world: LocalWorld, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(LocalGroup) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let threads: Vec<_> = world
        .into_handles()
        .into_iter()
        .map(|g| {
            let f = Arc::clone(&f);
            thread::spawn(move || f(g))
        })
        .collect();
    threads.into_iter().map(|t| t.join().unwrap()).collect()
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("ensembles.yaml");
    std::fs::write(&path, body).unwrap();
    path
}

fn two_ensembles(dir: &Path) -> PathBuf {
    let d = dir.display();
    write_config(
        dir,
        &format!(
            "ensembles:\n  \
               - [0, 3, [\"a\"], \"{d}/o0\", \"{d}/e0\"]\n  \
               - [4, 7, [\"b\"], \"{d}/o1\", \"{d}/e1\"]\n"
        ),
    )
}

fn detached() -> SessionBuilder {
    SessionBuilder::new().streams(StreamMode::Detached)
}

#[derive(Debug)]
struct RankView {
    argv: Vec<String>,
    argc: usize,
    arguments: Vec<String>,
    members: Vec<i32>,
    index: usize,
    splits: usize,
}

#[test]
fn eight_ranks_two_ensembles() {
    let dir = tempfile::tempdir().unwrap();
    let config = two_ensembles(dir.path());

    let views = on_every_rank(LocalWorld::new(8).unwrap(), move |world| {
        let args = vec!["./sim".to_string(), config.display().to_string()];
        let mut session = detached().init(args, &world).unwrap();
        let view = RankView {
            argv: session.argv().unwrap().as_slice().to_vec(),
            argc: session.argc().unwrap(),
            arguments: session.arguments().unwrap().to_vec(),
            members: session.comm().unwrap().members().to_vec(),
            index: session.ensemble_index().unwrap(),
            splits: world.split_calls(),
        };
        session.finalize().unwrap();
        view
    });

    assert_eq!(views[2].argv, vec!["./sim", "a"]);
    assert_eq!(views[2].members, vec![0, 1, 2, 3]);
    assert_eq!(views[2].index, 0);
    assert_eq!(views[6].argv, vec!["./sim", "b"]);
    assert_eq!(views[6].members, vec![4, 5, 6, 7]);
    assert_eq!(views[6].index, 1);

    for (rank, v) in views.iter().enumerate() {
        assert_eq!(v.splits, 2, "rank {rank}: one split per descriptor");
        assert_eq!(v.argc, v.arguments.len() + 1, "rank {rank}");
        assert_eq!(v.argv[0], "./sim", "rank {rank}");
    }

    for name in ["o0", "e0", "o1", "e1"] {
        assert!(dir.path().join(name).exists(), "{name} was not created");
    }
}

#[test]
fn sub_group_ranks_follow_parent_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = two_ensembles(dir.path());

    let ranks = on_every_rank(LocalWorld::new(8).unwrap(), move |world| {
        let mut session = detached().init_from_path(&config, &world).unwrap();
        let sub = session.comm().unwrap();
        let out = (sub.rank().unwrap(), sub.size().unwrap());
        session.finalize().unwrap();
        out
    });
    for (rank, (sub_rank, sub_size)) in ranks.into_iter().enumerate() {
        assert_eq!(sub_rank, rank as i32 % 4);
        assert_eq!(sub_size, 4);
    }
}

#[test]
fn path_init_uses_default_program_name() {
    let dir = tempfile::tempdir().unwrap();
    let config = two_ensembles(dir.path());

    let names = on_every_rank(LocalWorld::new(8).unwrap(), move |world| {
        let mut session = detached().init_from_path(&config, &world).unwrap();
        let name = session.argv().unwrap().program_name().to_string();
        session.finalize().unwrap();
        name
    });
    assert!(names.iter().all(|n| n == "a.out"));
}

#[test]
fn every_rank_matches_exactly_its_range() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().display();
    let config = write_config(
        dir.path(),
        &format!(
            "ensembles:\n  \
               - [0, 0, [\"solo\"], \"{d}/o0\", \"{d}/e0\"]\n  \
               - [1, 4, [\"mid\"], \"{d}/o1\", \"{d}/e1\"]\n  \
               - [5, 5, [\"last\"], \"{d}/o2\", \"{d}/e2\"]\n"
        ),
    );

    let out = on_every_rank(LocalWorld::new(6).unwrap(), move |world| {
        let mut session = detached().init_from_path(&config, &world).unwrap();
        let args = session.arguments().unwrap().to_vec();
        let size = session.comm().unwrap().size().unwrap();
        session.finalize().unwrap();
        (args, size, world.split_calls())
    });

    let expected = ["solo", "mid", "mid", "mid", "mid", "last"];
    for (rank, (args, size, splits)) in out.into_iter().enumerate() {
        assert_eq!(args, vec![expected[rank]]);
        assert_eq!(size, if expected[rank] == "mid" { 4 } else { 1 });
        assert_eq!(splits, 3);
    }
}

#[test]
fn rank_in_gap_is_not_a_member() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().display();
    let config = write_config(
        dir.path(),
        &format!("ensembles:\n  - [0, 1, [], \"{d}/o0\", \"{d}/e0\"]\n"),
    );

    let out = on_every_rank(LocalWorld::new(3).unwrap(), move |world| {
        let mut session = detached().init_from_path(&config, &world).unwrap();
        let member = session.is_member();
        let argv = session.argv().map(|a| a.argc());
        let comm_err = session.comm().err().map(|e| e.kind());
        let finalized = session.finalize().is_ok();
        (member, argv.ok(), comm_err, finalized, world.split_calls())
    });

    assert_eq!(out[0].0, true);
    assert_eq!(out[0].1, Some(1));
    assert_eq!(out[2].0, false);
    assert_eq!(out[2].1, None);
    assert_eq!(out[2].2, Some("NotMemberError"));
    assert!(out.iter().all(|o| o.3));
    assert!(out.iter().all(|o| o.4 == 1));
}

#[test]
fn finalize_twice_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = two_ensembles(dir.path());

    let out = on_every_rank(LocalWorld::new(8).unwrap(), move |world| {
        let mut session = detached().init_from_path(&config, &world).unwrap();
        session.finalize().unwrap();
        let second = session.finalize();
        let after = session.arguments().map(|a| a.len());
        (
            matches!(second, Err(Error::ResourceState(_))),
            matches!(after, Err(Error::ResourceState(_))),
            session.is_finalized(),
            world.release_calls(),
        )
    });
    for (rank, (second, after, finalized, releases)) in out.into_iter().enumerate() {
        assert!(second, "rank {rank}");
        assert!(after, "rank {rank}");
        assert!(finalized, "rank {rank}");
        // One inactive sub-group discarded during init, the ensemble's at finalize
        assert_eq!(releases, 2, "rank {rank}");
    }
}

#[test]
fn missing_path_argument_fails_before_any_split() {
    let out = on_every_rank(LocalWorld::new(2).unwrap(), |world| {
        let err = Session::init(vec!["./sim"], &world).unwrap_err();
        (err.is_configuration(), world.split_calls())
    });
    assert!(out.iter().all(|&(config, splits)| config && splits == 0));
}

#[test]
fn malformed_descriptor_fails_before_any_split() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "ensembles:\n  - [0, 3, [\"a\"], \"o0\", \"e0\"]\n  - [4, 7, [\"b\"], \"o1\"]\n",
    );

    let out = on_every_rank(LocalWorld::new(8).unwrap(), move |world| {
        let err = Session::init_from_path(&config, &world).unwrap_err();
        (err.kind(), world.split_calls())
    });
    for (kind, splits) in out {
        assert_eq!(kind, "ConfigurationError");
        assert_eq!(splits, 0);
    }
}

#[test]
fn overlapping_ranges_need_lenient_mode() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().display();
    let config = write_config(
        dir.path(),
        &format!(
            "ensembles:\n  \
               - [0, 2, [\"first\"], \"{d}/o0\", \"{d}/e0\"]\n  \
               - [2, 3, [\"second\"], \"{d}/o1\", \"{d}/e1\"]\n"
        ),
    );

    let strict = {
        let config = config.clone();
        on_every_rank(LocalWorld::new(4).unwrap(), move |world| {
            let err = detached().init_from_path(&config, &world).unwrap_err();
            (err.is_configuration(), world.split_calls())
        })
    };
    assert!(strict.iter().all(|&(c, s)| c && s == 0));

    let lenient = on_every_rank(LocalWorld::new(4).unwrap(), move |world| {
        let mut session = detached().lenient(true).init_from_path(&config, &world).unwrap();
        let args = session.arguments().unwrap().to_vec();
        session.finalize().unwrap();
        args
    });
    assert_eq!(lenient[2], vec!["first"]);
    assert_eq!(lenient[3], vec!["second"]);
}

#[test]
fn unopenable_output_is_io_error_after_all_splits() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().display();
    let config = write_config(
        dir.path(),
        &format!(
            "ensembles:\n  \
               - [0, 1, [], \"{d}/o0\", \"{d}/e0\"]\n  \
               - [2, 3, [], \"{d}/missing/o1\", \"{d}/e1\"]\n"
        ),
    );

    let out = on_every_rank(LocalWorld::new(4).unwrap(), move |world| {
        let result = detached().init_from_path(&config, &world);
        let kind = result.as_ref().err().map(Error::kind);
        if let Ok(mut session) = result {
            session.finalize().unwrap();
        }
        (kind, world.split_calls(), world.release_calls())
    });

    assert_eq!(out[0].0, None);
    assert_eq!(out[1].0, None);
    assert_eq!(out[2].0, Some("IOError"));
    assert_eq!(out[3].0, Some("IOError"));
    for (_, splits, releases) in &out {
        assert_eq!(*splits, 2);
        assert_eq!(*releases, 2);
    }
}

#[test]
fn split_failure_aborts_every_rank() {
    let dir = tempfile::tempdir().unwrap();
    let config = two_ensembles(dir.path());

    let out = on_every_rank(LocalWorld::new(8).unwrap().fail_split_at(1), move |world| {
        let err = detached().init_from_path(&config, &world).unwrap_err();
        (err.kind(), world.release_calls())
    });
    for (rank, (kind, releases)) in out.into_iter().enumerate() {
        assert_eq!(kind, "CollectiveOperationError");
        // Ranks 0..4 matched the first split and hand that group back; others
        // released their inactive group right away
        assert_eq!(releases, 1, "rank {rank}");
    }
}

#[test]
fn detached_writers_reach_ensemble_files() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().display();
    let config = write_config(
        dir.path(),
        &format!(
            "ensembles:\n  \
               - [0, 0, [], \"{d}/o0\", \"{d}/e0\"]\n  \
               - [1, 1, [], \"{d}/o1\", \"{d}/e1\"]\n"
        ),
    );

    on_every_rank(LocalWorld::new(2).unwrap(), move |world| {
        let mut session = detached().init_from_path(&config, &world).unwrap();
        let rank = world.rank().unwrap();
        writeln!(session.stdout().unwrap(), "out from {rank}").unwrap();
        writeln!(session.stderr().unwrap(), "err from {rank}").unwrap();
        session.finalize().unwrap();
    });

    let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
    assert_eq!(read("o0"), "out from 0\n");
    assert_eq!(read("e0"), "err from 0\n");
    assert_eq!(read("o1"), "out from 1\n");
    assert_eq!(read("e1"), "err from 1\n");
}

#[test]
fn decoded_config_can_be_used_directly() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_path_buf();

    let out = on_every_rank(LocalWorld::new(4).unwrap(), move |world| {
        let config = EnsembleConfig::new(vec![
            EnsembleDescriptor::new(0, 1, ["--n", "1"], base.join("o0"), base.join("e0")),
            EnsembleDescriptor::new(2, 3, ["--n", "2"], base.join("o1"), base.join("e1")),
        ])
        .unwrap();
        let mut session = detached()
            .program_name("solver")
            .init_from_config(config, &world)
            .unwrap();
        let argv = session.argv().unwrap().as_slice().to_vec();
        session.finalize().unwrap();
        argv
    });
    assert_eq!(out[1], vec!["solver", "--n", "1"]);
    assert_eq!(out[3], vec!["solver", "--n", "2"]);
}

#[test]
fn dropping_an_active_session_releases_its_group() {
    let dir = tempfile::tempdir().unwrap();
    let config = two_ensembles(dir.path());

    let releases = on_every_rank(LocalWorld::new(8).unwrap(), move |world| {
        {
            let _session = detached().init_from_path(&config, &world).unwrap();
        }
        world.release_calls()
    });
    assert!(releases.iter().all(|&r| r == 2));
}

#[test]
fn finalize_reports_release_failure_and_still_finalizes() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().display();
    let config = write_config(
        dir.path(),
        &format!("ensembles:\n  - [0, 1, [], \"{d}/o0\", \"{d}/e0\"]\n"),
    );

    // Nothing is released during init, so finalize issues release call 0
    let world = LocalWorld::new(2).unwrap().fail_release_at(0);
    let out = on_every_rank(world, move |world| {
        let mut session = detached().init_from_path(&config, &world).unwrap();
        let first = session.finalize();
        let second = session.finalize();
        (
            matches!(first, Err(Error::Collective { operation: "release", .. })),
            session.is_finalized(),
            matches!(second, Err(Error::ResourceState(_))),
            world.release_calls(),
        )
    });
    for (rank, (failed, finalized, second, releases)) in out.into_iter().enumerate() {
        assert!(failed, "rank {rank}");
        assert!(finalized, "rank {rank}");
        assert!(second, "rank {rank}");
        assert_eq!(releases, 1, "rank {rank}");
    }
}
