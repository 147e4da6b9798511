//! Ensembles without MPI: thread-backed ranks in one process.
//!
//! Useful to try a configuration file before submitting the real job.
//! Streams are detached because all ranks share this process.
//!
//! Run with: cargo run --example local_ensembles -- demos/ensembles.yaml [world_size]

use ensembler::{EnsembleConfig, LocalWorld, ProcessGroup, SessionBuilder, StreamMode};
use std::io::Write;
use std::thread;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: local_ensembles <config> [world_size]")?;
    let config = EnsembleConfig::from_file(&path)?;
    let world_size = match args.next() {
        Some(n) => n.parse()?,
        None => config.required_world_size() as usize,
    };

    let threads: Vec<_> = LocalWorld::new(world_size)?
        .into_handles()
        .into_iter()
        .map(|world| {
            let config = config.clone();
            thread::spawn(move || -> ensembler::Result<String> {
                let mut session = SessionBuilder::new()
                    .program_name("local")
                    .streams(StreamMode::Detached)
                    .init_from_config(config, &world)?;
                let rank = world.rank()?;
                let line = if session.is_member() {
                    let comm = session.comm()?;
                    let line = format!(
                        "rank {rank}: ensemble {} ({}/{}), argv {:?}",
                        session.ensemble_index()?,
                        comm.rank()?,
                        comm.size()?,
                        session.argv()?
                    );
                    let out = session.stdout()?;
                    writeln!(out, "{line}").map_err(|e| ensembler::Error::io(out.path(), e))?;
                    line
                } else {
                    format!("rank {rank}: no ensemble")
                };
                session.finalize()?;
                Ok(line)
            })
        })
        .collect();

    for t in threads {
        match t.join() {
            Ok(Ok(line)) => println!("{line}"),
            Ok(Err(e)) => eprintln!("{}: {e}", e.kind()),
            Err(_) => eprintln!("rank thread panicked"),
        }
    }
    Ok(())
}
