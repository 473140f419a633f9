use graphsync::config::{GraphConfig, StoreConfig};
use graphsync::io::GraphMirror;
use graphsync::pool::Pool;
use graphsync::record::{BufferKind, EdgeRecord, NodeRecord, Record};
use graphsync::{Graph, GraphError, GraphEvent};
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::{mpsc, Arc};

fn small_config() -> GraphConfig {
    GraphConfig {
        nodes: StoreConfig {
            block_size: 8,
            max_modified: 3,
        },
        edges: StoreConfig {
            block_size: 8,
            max_modified: 3,
        },
        lock_name: "Graph".to_string(),
    }
}

fn mirrored(graph: &Graph) -> Arc<Mutex<GraphMirror>> {
    let mirror = Arc::new(Mutex::new(GraphMirror::new()));
    let target = Arc::clone(&mirror);
    graph
        .events()
        .observe(move |event: &GraphEvent| target.lock().apply(event).unwrap());
    mirror
}

#[test]
fn test_mirror_follows_graph_edits() {
    let graph = Graph::new(&small_config()).unwrap();
    let mirror = mirrored(&graph);

    let (a, b, c, ab, bc) = {
        let mut g = graph.write().unwrap();
        let a = g.add_node(NodeRecord::new([0.0, 0.0], 1.0, [255, 0, 0]));
        let b = g.add_node(NodeRecord::new([4.0, 0.0], 1.0, [0, 255, 0]));
        let c = g.add_node(NodeRecord::new([0.0, 4.0], 1.0, [0, 0, 255]));
        let ab = g.add_edge(a, b, 0.5, [9, 9, 9]).unwrap();
        let bc = g.add_edge(b, c, 0.5, [9, 9, 9]).unwrap();
        g.flush_changes();
        (a, b, c, ab, bc)
    };

    {
        let m = mirror.lock();
        assert_eq!(m.nodes.record::<NodeRecord>(b).unwrap().pos, [4.0, 0.0]);
        assert_eq!(m.edges.record::<EdgeRecord>(bc).unwrap().to, [0.0, 4.0]);
    }

    {
        let mut g = graph.write().unwrap();
        g.move_node(b, [2.0, 2.0]).unwrap();
        g.remove_node(a).unwrap();
        g.flush_changes();
    }

    let m = mirror.lock();
    assert_eq!(m.nodes.record::<NodeRecord>(b).unwrap().pos, [2.0, 2.0]);
    assert!(m.nodes.record::<NodeRecord>(a).unwrap().is_deleted());
    assert!(m.edges.record::<EdgeRecord>(ab).unwrap().is_deleted());
    let edge = m.edges.record::<EdgeRecord>(bc).unwrap();
    assert_eq!(edge.from, [2.0, 2.0]);
    assert!(!edge.is_deleted());

    let g = graph.read();
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edge_count(), 1);
    assert_eq!(g.nodes().side(c).adj_edges, vec![bc]);
}

#[test]
fn test_mirror_matches_store_after_many_flushes() {
    let graph = Graph::new(&small_config()).unwrap();
    let mirror = mirrored(&graph);

    let mut nodes = Vec::new();
    for round in 0..20u8 {
        let mut g = graph.write().unwrap();
        let x = f32::from(round);
        nodes.push(g.add_node(NodeRecord::new([x, x], 1.0, [round, 0, 0])));
        if nodes.len() > 1 {
            let n = nodes.len();
            g.add_edge(nodes[n - 2], nodes[n - 1], 1.0, [0, round, 0]).unwrap();
        }
        if round % 5 == 4 {
            let victim = nodes.remove(0);
            g.remove_node(victim).unwrap();
        }
        for &n in &nodes {
            g.move_node(n, [x, -x]).unwrap();
        }
        g.flush_changes();
    }

    let g = graph.read();
    let m = mirror.lock();
    for kind in [BufferKind::Node, BufferKind::Edge] {
        let (len, view) = match kind {
            BufferKind::Node => (g.nodes().len(), &m.nodes),
            BufferKind::Edge => (g.edges().len(), &m.edges),
        };
        let expected = g.snapshot(kind).to_vec();
        let got = view.slot_bytes(0, len);
        assert_eq!(got, &expected[..got.len()], "{kind:?} mirror diverged");
    }
}

#[test]
fn test_short_edits_rejected_while_layout_runs() {
    let graph = Arc::new(Graph::new(&small_config()).unwrap());
    let mirror = mirrored(&graph);
    let pool = Pool::new(NonZeroUsize::new(2).unwrap()).unwrap();

    let a = graph.write().unwrap().add_node(NodeRecord::new([0.0, 0.0], 1.0, [0; 3]));

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel();
    {
        let graph = Arc::clone(&graph);
        pool.launch(move || {
            let result = (|| -> Result<(), GraphError> {
                let mut task = graph.lock_long("layout")?;
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                task.move_node(a, [1.0, 1.0])?;
                task.flush_changes();
                task.checkpoint()
            })();
            done_tx.send(result).unwrap();
        });
    }

    started_rx.recv().unwrap();
    assert_eq!(mirror.lock().running_task(), Some("layout"));

    let (edit_tx, edit_rx) = mpsc::channel();
    {
        let graph = Arc::clone(&graph);
        pool.launch(move || {
            let result = graph.write().map(|mut g| g.add_node(NodeRecord::default()));
            edit_tx.send(result).unwrap();
        });
    }
    let err = edit_rx.recv().unwrap().unwrap_err();
    assert_eq!(err.to_string(), "Graph cannot be modified since layout is running");

    release_tx.send(()).unwrap();
    assert_eq!(done_rx.recv().unwrap(), Ok(()));
    drop(pool);

    assert_eq!(mirror.lock().running_task(), None);
    assert_eq!(mirror.lock().nodes.record::<NodeRecord>(a).unwrap().pos, [1.0, 1.0]);
    assert!(graph.write().is_ok());
}
