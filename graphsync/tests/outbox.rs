use graphsync::config::GraphConfig;
use graphsync::io::{GraphMirror, Outbox};
use graphsync::record::NodeRecord;
use graphsync::{Graph, GraphEvent};
use std::sync::Arc;

#[tokio::test]
async fn test_consumer_rebuilds_graph_from_outbox() {
    let graph = Arc::new(Graph::new(&GraphConfig::default()).unwrap());
    let mut rx = Outbox::attach(graph.events()).unwrap();

    let producer = Arc::clone(&graph);
    let slots = std::thread::spawn(move || {
        let mut task = producer.lock_long("import").unwrap();
        let slots: Vec<usize> = (0..50u8)
            .map(|i| task.add_node(NodeRecord::new([f32::from(i), 0.0], 1.0, [i, i, i])))
            .collect();
        for pair in slots.windows(2) {
            task.add_edge(pair[0], pair[1], 1.0, [0; 3]).unwrap();
        }
        task.flush_changes();
        slots
    })
    .join()
    .unwrap();

    let mut mirror = GraphMirror::new();
    let mut saw_start = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(&event, GraphEvent::TaskStatusChanged { name: Some(n) } if n == "import") {
            saw_start = true;
        }
        mirror.apply(&event).unwrap();
    }

    assert!(saw_start);
    assert_eq!(mirror.running_task(), None);
    for (i, &slot) in slots.iter().enumerate() {
        let record = mirror.nodes.record::<NodeRecord>(slot).unwrap();
        assert_eq!(record.pos[0], i as f32);
    }
    assert!(mirror.edges.capacity() >= 49);
}

#[tokio::test]
async fn test_events_await_across_threads() {
    let graph = Arc::new(Graph::new(&GraphConfig::default()).unwrap());
    let mut rx = Outbox::attach(graph.events()).unwrap();

    let producer = Arc::clone(&graph);
    std::thread::spawn(move || {
        let mut g = producer.write().unwrap();
        g.add_node(NodeRecord::default());
        g.flush_changes();
    });

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, GraphEvent::BufferReplaced { .. }));
    let second = rx.recv().await.unwrap();
    assert!(matches!(second, GraphEvent::SlotUpdate { slot: 0, .. }));
}
