use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use graphsync::animation::AnimationSet;
use graphsync::config::GraphConfig;
use graphsync::io::{GraphMirror, Mirror, Outbox};
use graphsync::pool::Pool;
use graphsync::{BufferKind, ErrorKind, Graph, GraphData};
use graphsync_cli::highlight;
use graphsync_cli::{random_graph, run_layout, LayoutParams, LayoutReport};
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Run a background layout against a random graph while an editor issues
/// short writes and a consumer mirrors the published diffs
#[derive(Parser, Debug)]
#[command(name = "graphsync-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of nodes
    #[arg(long, default_value_t = 200)]
    nodes: usize,

    /// Number of random edges to try
    #[arg(long, default_value_t = 400)]
    edges: usize,

    /// Layout iterations
    #[arg(long, default_value_t = 100)]
    iterations: usize,

    /// JSON store configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cancel the layout after this many milliseconds
    #[arg(long)]
    cancel_after: Option<u64>,

    /// Worker threads (defaults to the number of CPUs)
    #[arg(long)]
    workers: Option<NonZeroUsize>,

    /// Random seed
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

#[derive(Debug, Default)]
struct EditReport {
    applied: usize,
    busy: usize,
}

/// Nudge random nodes in short write sections until `done` is set
fn edit_until(graph: &Graph, done: &AtomicBool, seed: u64) -> EditReport {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut report = EditReport::default();
    while !done.load(Ordering::SeqCst) {
        match graph.write() {
            Ok(mut data) => {
                let picked = data.nodes().iter_live().choose(&mut rng);
                if let Some((slot, record)) = picked {
                    let pos = [
                        record.pos[0] + rng.gen_range(-1.0f32..1.0),
                        record.pos[1] + rng.gen_range(-1.0f32..1.0),
                    ];
                    if let Err(e) = data.move_node(slot, pos) {
                        warn!(error = %e, "edit failed");
                    }
                    data.flush_changes();
                }
                report.applied += 1;
            }
            Err(e) if e.kind() == ErrorKind::Busy => {
                debug!(error = %e, "edit rejected");
                report.busy += 1;
            }
            Err(e) => {
                warn!(error = %e, "editor stopped");
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    report
}

/// Whether the first `len` records of `mirror` equal `expected`
fn in_sync(mirror: &Mirror, len: usize, expected: &[u8]) -> bool {
    if mirror.capacity() < len {
        return false;
    }
    let got = mirror.slot_bytes(0, len);
    expected.get(..got.len()) == Some(got)
}

fn pulse_random_node(graph: &Graph, rng: &mut StdRng) -> Result<usize, graphsync::GraphError> {
    let slot = graph.read().nodes().iter_live().map(|(slot, _)| slot).choose(rng);
    let Some(slot) = slot else {
        return Ok(0);
    };

    let mut effects: AnimationSet<GraphData> = AnimationSet::new();
    if highlight::pulse(&mut effects, &graph.read(), slot, 0.25).is_none() {
        return Ok(0);
    }
    let mut frames = 0;
    while !effects.is_empty() {
        let mut data = graph.write()?;
        effects.tick(&mut data, 1.0 / 60.0);
        data.flush_changes();
        frames += 1;
    }
    Ok(frames)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => GraphConfig::from_file(path)?,
        None => GraphConfig::default(),
    };

    let graph = Arc::new(Graph::new(&config)?);

    // Consumer: mirror every published event on the async side
    let mut rx = Outbox::attach(graph.events())?;
    let consumer = tokio::spawn(async move {
        let mut mirror = GraphMirror::new();
        while let Some(event) = rx.recv().await {
            if let Err(e) = mirror.apply(&event) {
                warn!(error = %e, "mirror out of sync");
            }
        }
        mirror
    });

    let mut rng = StdRng::seed_from_u64(cli.seed);
    {
        let mut data = graph.write()?;
        random_graph(&mut data, cli.nodes, cli.edges, &mut rng)?;
        data.flush_changes();
        info!(nodes = data.node_count(), edges = data.edge_count(), "graph ready");
    }

    let pool = match cli.workers {
        Some(n) => Pool::new(n)?,
        None => Pool::with_default_size()?,
    };
    if pool.size() < 2 {
        warn!("single worker: the editor only runs after the layout");
    }

    let (layout_tx, mut layout_rx) = oneshot::channel();
    {
        let graph = Arc::clone(&graph);
        let params = LayoutParams {
            iterations: cli.iterations,
            ..LayoutParams::default()
        };
        pool.launch(move || {
            let _ = layout_tx.send(run_layout(&graph, &params));
        });
    }

    let layout_done = Arc::new(AtomicBool::new(false));
    let (edit_tx, edit_rx) = oneshot::channel();
    {
        let graph = Arc::clone(&graph);
        let done = Arc::clone(&layout_done);
        let seed = cli.seed.wrapping_add(1);
        pool.launch(move || {
            let _ = edit_tx.send(edit_until(&graph, &done, seed));
        });
    }

    let layout: LayoutReport = match cli.cancel_after {
        Some(ms) => {
            tokio::select! {
                result = &mut layout_rx => result??,
                () = tokio::time::sleep(Duration::from_millis(ms)) => {
                    if graph.cancel() {
                        info!(after_ms = ms, "layout cancellation requested");
                    }
                    layout_rx.await??
                }
            }
        }
        None => layout_rx.await??,
    };
    layout_done.store(true, Ordering::SeqCst);
    let edits = edit_rx.await?;
    drop(pool);

    let frames = pulse_random_node(&graph, &mut rng)?;

    let (node_len, node_bytes, edge_len, edge_bytes) = {
        let data = graph.read();
        (
            data.nodes().len(),
            data.snapshot(BufferKind::Node).to_vec(),
            data.edges().len(),
            data.snapshot(BufferKind::Edge).to_vec(),
        )
    };

    // Dropping the last graph handle closes the outbox
    drop(graph);
    let mirror = consumer.await?;

    let synced = in_sync(&mirror.nodes, node_len, &node_bytes) && in_sync(&mirror.edges, edge_len, &edge_bytes);

    println!("layout:  {} iterations, cancelled: {}", layout.iterations, layout.cancelled);
    println!("         last displacement {:.3}", layout.last_displacement);
    println!("editor:  {} edits applied, {} rejected as busy", edits.applied, edits.busy);
    println!("pulse:   {frames} frames");
    println!("mirror:  {} events applied, in sync: {synced}", mirror.applied());
    Ok(())
}
