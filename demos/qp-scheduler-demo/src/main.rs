//!
//! qp-scheduler-demo - demonstrates the diamond-dependency batch from
//! qp-scheduler's own docs: A has no parents, B and C depend on A, D
//! depends on both A and C. Sorts the batch, runs it across a
//! configurable worker pool, and prints each unit's result as it joins.
//!

use clap::Parser;
use qp_scheduler::{OrderedBatch, Scheduler, Unit};

#[derive(Parser)]
#[command(name = "qp-scheduler-demo")]
#[command(author, version, about = "Demonstrates qp-scheduler on a diamond-shaped batch", long_about = None)]
struct Cli {
    /// Number of worker threads in the pool.
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Milliseconds each unit of weight costs, simulating work.
    #[arg(long, default_value_t = 10)]
    unit_ms: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let mut batch = OrderedBatch::new();
    let mut outputs = Vec::new();

    let mut a = Unit::new(1);
    let a_id = a.id();
    outputs.push((a_id, a.bind(move || job(a_id, 1, cli.unit_ms))));
    batch.push(a);

    let mut b = Unit::with_parent(5, a_id);
    let b_id = b.id();
    outputs.push((b_id, b.bind(move || job(b_id, 5, cli.unit_ms))));
    batch.push(b);

    let mut c = Unit::with_parent(2, a_id);
    let c_id = c.id();
    outputs.push((c_id, c.bind(move || job(c_id, 2, cli.unit_ms))));
    batch.push(c);

    let mut d = Unit::with_parents(10, vec![a_id, c_id]);
    let d_id = d.id();
    outputs.push((d_id, d.bind(move || job(d_id, 10, cli.unit_ms))));
    batch.push(d);

    println!("running {} units across {} workers", batch.len(), cli.workers);

    let mut scheduler = Scheduler::new(batch, cli.workers);
    if let Err(err) = scheduler.run() {
        eprintln!("scheduler failed to start: {err}");
        std::process::exit(1);
    }
    scheduler.wait();

    for (id, out) in outputs {
        println!("  > unit {id} result: {}", out.join());
    }
}

fn job(id: u64, weight: u64, unit_ms: u64) -> u64 {
    println!(
        "  > thread {:?}  start job. id: {id} weight: {weight}",
        std::thread::current().id()
    );
    std::thread::sleep(std::time::Duration::from_millis(weight * unit_ms));
    println!(
        "  > thread {:?} finish job. id: {id} weight: {weight}",
        std::thread::current().id()
    );
    id * id
}
