//! Integration test for ensemble partitioning over MPI.
//!
//! Exercises Session init/finalize on MPI_COMM_WORLD: halves, gaps,
//! per-rank redirected output and lifecycle errors.
//!
//! Run with: mpiexec -n 8 ./target/debug/examples/test_ensemble_split

use ensembler::{
    EnsembleConfig, EnsembleDescriptor, Error, Mpi, SessionBuilder, StreamMode,
};
use std::path::PathBuf;

fn scratch_dir() -> PathBuf {
    let job = std::env::var("SLURM_JOB_ID")
        .or_else(|_| std::env::var("PMI_ID"))
        .unwrap_or_else(|_| "local".into());
    let dir = std::env::temp_dir().join(format!("ensembler-test-{job}"));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn main() {
    let mpi = Mpi::init().expect("MPI init failed");
    let world = mpi.world();
    let rank = world.rank();
    let size = world.size();
    let dir = scratch_dir();

    assert!(
        size >= 4 && size % 2 == 0,
        "test_ensemble_split requires an even number of processes >= 4, got {size}"
    );

    // ========================================================================
    // Test 1: Two halves
    // ========================================================================
    {
        let half = size / 2;
        let config = EnsembleConfig::new(vec![
            EnsembleDescriptor::new(0, half - 1, ["a"], dir.join("o0"), dir.join("e0")),
            EnsembleDescriptor::new(half, size - 1, ["b"], dir.join("o1"), dir.join("e1")),
        ])
        .expect("valid config");

        let mut session = SessionBuilder::new()
            .program_name("prog")
            .streams(StreamMode::Detached)
            .init_from_config(config, &world)
            .expect("init failed");

        let comm = session.comm().expect("comm");
        assert_eq!(comm.size(), half, "rank {rank}: ensemble size");
        assert_eq!(comm.rank(), rank % half, "rank {rank}: ensemble rank");

        let expected = if rank < half { "a" } else { "b" };
        let argv = session.argv().expect("argv");
        assert_eq!(argv.as_slice(), ["prog", expected], "rank {rank}: argv");
        assert_eq!(session.argc().expect("argc"), 2);

        session.finalize().expect("finalize failed");
        if rank == 0 {
            println!("PASS: two halves");
        }
    }

    // ========================================================================
    // Test 2: Gap at rank 1
    // ========================================================================
    {
        let config = EnsembleConfig::new(vec![
            EnsembleDescriptor::new(0, 0, ["solo"], dir.join("g0"), dir.join("ge0")),
            EnsembleDescriptor::new(2, size - 1, ["rest"], dir.join("g1"), dir.join("ge1")),
        ])
        .expect("valid config");

        let mut session = SessionBuilder::new()
            .streams(StreamMode::Detached)
            .init_from_config(config, &world)
            .expect("init failed");

        if rank == 1 {
            assert!(!session.is_member());
            assert!(matches!(session.comm(), Err(Error::NotMember { rank: 1 })));
        } else {
            let expected_size = if rank == 0 { 1 } else { size - 2 };
            assert_eq!(session.comm().expect("comm").size(), expected_size);
        }
        session.finalize().expect("finalize failed");
        if rank == 0 {
            println!("PASS: gap leaves rank 1 unassigned");
        }
    }

    // ========================================================================
    // Test 3: One ensemble per rank, redirected output
    // ========================================================================
    {
        let descriptors = (0..size)
            .map(|r| {
                EnsembleDescriptor::new(
                    r,
                    r,
                    [format!("--id={r}")],
                    dir.join(format!("rank{r}.out")),
                    dir.join(format!("rank{r}.err")),
                )
            })
            .collect();
        let config = EnsembleConfig::new(descriptors).expect("valid config");

        let mut session = SessionBuilder::new()
            .init_from_config(config, &world)
            .expect("init failed");
        println!("hello from {}", session.arguments().expect("arguments")[0]);
        eprintln!("rank {rank} stderr");
        session.finalize().expect("finalize failed");

        let out = std::fs::read_to_string(dir.join(format!("rank{rank}.out"))).expect("read out");
        assert_eq!(out, format!("hello from --id={rank}\n"), "rank {rank}: stdout file");
        let err = std::fs::read_to_string(dir.join(format!("rank{rank}.err"))).expect("read err");
        assert_eq!(err, format!("rank {rank} stderr\n"), "rank {rank}: stderr file");

        if rank == 0 {
            println!("PASS: per-rank redirect");
        }
    }

    // ========================================================================
    // Test 4: Lifecycle errors
    // ========================================================================
    {
        let config = EnsembleConfig::new(vec![EnsembleDescriptor::new(
            0,
            size - 1,
            Vec::<String>::new(),
            dir.join("all.out"),
            dir.join("all.err"),
        )])
        .expect("valid config");
        let mut session = SessionBuilder::new()
            .streams(StreamMode::Detached)
            .init_from_config(config, &world)
            .expect("init failed");
        session.finalize().expect("finalize failed");
        assert!(matches!(session.finalize(), Err(Error::ResourceState(_))));
        assert!(matches!(session.argv(), Err(Error::ResourceState(_))));

        let missing = mpi.session(vec!["prog"]);
        assert!(matches!(missing, Err(ref e) if e.is_configuration()));

        if rank == 0 {
            println!("PASS: lifecycle errors");
        }
    }

    drop(world);
    drop(mpi);

    if rank == 0 {
        println!("\n========================================");
        println!("All ensemble split tests passed! (4 tests)");
        println!("========================================");
    }
}
