//! Parametric sweep: every ensemble parses its own argv with clap.
//!
//! Each ensemble estimates pi by Monte Carlo with its own sample count and
//! seed, then rank 0 of the ensemble reports the estimate through the
//! ensemble's stdout file.
//!
//! Run with: mpiexec -n 8 cargo run --features mpi --example parametric_sweep -- demos/sweep.yaml

use clap::Parser;
use ensembler::{Mpi, Session};

#[derive(Parser, Debug)]
#[command(name = "sweep")]
struct SweepArgs {
    /// Samples drawn by every rank of the ensemble
    #[arg(long, default_value_t = 100_000)]
    samples: u64,
    /// Base seed; each rank offsets it by its ensemble rank
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Label printed with the result
    #[arg(long, default_value = "run")]
    label: String,
}

/// xorshift64*, enough for a demo
fn next_unit(state: &mut u64) -> f64 {
    *state ^= *state >> 12;
    *state ^= *state << 25;
    *state ^= *state >> 27;
    let bits = state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
    bits as f64 / (1u64 << 53) as f64
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mpi = Mpi::init()?;
    let world = mpi.world();
    let mut session = Session::init(std::env::args(), &world)?;

    if !session.is_member() {
        session.finalize()?;
        return Ok(());
    }

    let args = SweepArgs::try_parse_from(session.argv()?.iter())?;
    let comm = session.comm()?;
    let rank = comm.rank();

    let mut state = args.seed.wrapping_add(rank as u64).max(1);
    let mut hits = 0u64;
    for _ in 0..args.samples {
        let (x, y) = (next_unit(&mut state), next_unit(&mut state));
        if x * x + y * y <= 1.0 {
            hits += 1;
        }
    }
    let local = 4.0 * hits as f64 / args.samples as f64;
    eprintln!("[{}] rank {rank}: local estimate {local:.6}", args.label);

    if rank == 0 {
        println!(
            "[{}] {} ranks x {} samples, rank 0 estimate = {local:.6}",
            args.label,
            comm.size(),
            args.samples
        );
    }

    session.finalize()?;
    Ok(())
}
