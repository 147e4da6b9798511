//! Hello world per ensemble.
//!
//! Each rank prints its world rank, its ensemble rank and the arguments of
//! its ensemble. The output ends up in the ensemble's stdout file.
//!
//! Run with: mpiexec -n 8 cargo run --features mpi --example ensemble_hello -- demos/ensembles.yaml

use ensembler::{Mpi, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mpi = Mpi::init()?;
    let world = mpi.world();

    let mut session = mpi.session(std::env::args())?;

    if session.is_member() {
        let comm = session.comm()?;
        println!(
            "world rank {}/{} -> ensemble {} rank {}/{}, argv = {:?}",
            world.rank(),
            world.size(),
            session.ensemble_index()?,
            comm.rank(),
            comm.size(),
            session.argv()?,
        );
    }

    session.finalize()?;
    Ok(())
}
