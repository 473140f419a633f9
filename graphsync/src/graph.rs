//! Graph aggregate
//!
//! [`GraphData`] owns one record store per element kind and the attribute
//! tables of each kind, and keeps the topology consistent when elements are
//! added, moved or removed. [`Graph`] puts a [`GraphData`] behind a
//! [`TaskLock`] and merges everything that is observable from outside into
//! one event channel:
//!
//! ```text
//!   node store updates ----\
//!   edge store updates -----+--> Graph::events() --> observers, sink (Outbox)
//!   lock status changes ---/
//! ```

use tracing::{debug, warn};

use crate::attributes::AttributeSet;
use crate::config::GraphConfig;
use crate::emitter::Emitter;
use crate::error::GraphError;
use crate::events::GraphEvent;
use crate::io::SharedBuffer;
use crate::lock::{LockStatus, LongGuard, ReadGuard, TaskLock, WriteGuard};
use crate::record::{flags, BufferKind, EdgeData, EdgeRecord, NodeData, NodeRecord, Record};
use crate::store::RecordStore;

pub type NodeStore = RecordStore<NodeRecord, NodeData>;
pub type EdgeStore = RecordStore<EdgeRecord, EdgeData>;

#[derive(Debug)]
pub struct GraphData {
    nodes: NodeStore,
    edges: EdgeStore,
    node_attributes: AttributeSet,
    edge_attributes: AttributeSet,
}

impl GraphData {
    #[must_use]
    pub fn new(config: &GraphConfig) -> Self {
        Self {
            nodes: NodeStore::new(config.nodes),
            edges: EdgeStore::new(config.edges),
            node_attributes: AttributeSet::new(),
            edge_attributes: AttributeSet::new(),
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &EdgeStore {
        &self.edges
    }

    #[must_use]
    pub fn node_attributes(&self) -> &AttributeSet {
        &self.node_attributes
    }

    pub fn node_attributes_mut(&mut self) -> &mut AttributeSet {
        &mut self.node_attributes
    }

    #[must_use]
    pub fn edge_attributes(&self) -> &AttributeSet {
        &self.edge_attributes
    }

    pub fn edge_attributes_mut(&mut self) -> &mut AttributeSet {
        &mut self.edge_attributes
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.live_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.live_count()
    }

    /// Insert a node and return its slot
    pub fn add_node(&mut self, mut record: NodeRecord) -> usize {
        record.flags &= !flags::DELETED;
        let slot = self.nodes.add(1);
        let generation = self.nodes.side(slot).generation.wrapping_add(1);
        *self.nodes.side_mut(slot) = NodeData {
            adj_edges: Vec::new(),
            generation,
        };
        self.nodes.set(slot, Some(record));
        slot
    }

    /// Connect two live nodes; the edge's endpoints start at the nodes'
    /// current positions
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Other`] if either endpoint is not a live node.
    pub fn add_edge(&mut self, from: usize, to: usize, width: f32, color: [u8; 3]) -> Result<usize, GraphError> {
        self.check_node(from)?;
        self.check_node(to)?;

        let record = EdgeRecord::new(self.nodes.record(from).pos, self.nodes.record(to).pos, width, color);
        let slot = self.edges.add(1);
        *self.edges.side_mut(slot) = EdgeData { from, to };
        self.edges.set(slot, Some(record));

        self.nodes.side_mut(from).adj_edges.push(slot);
        if to != from {
            self.nodes.side_mut(to).adj_edges.push(slot);
        }
        Ok(slot)
    }

    /// Move a node and drag the endpoints of its incident edges along
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Other`] if `slot` is not a live node.
    pub fn move_node(&mut self, slot: usize, pos: [f32; 2]) -> Result<(), GraphError> {
        self.check_node(slot)?;

        let mut node = self.nodes.record(slot);
        node.pos = pos;
        self.nodes.set(slot, Some(node));

        for &edge in &self.nodes.side(slot).adj_edges {
            let ends = *self.edges.side(edge);
            let mut record = self.edges.record(edge);
            if ends.from == slot {
                record.from = pos;
            }
            if ends.to == slot {
                record.to = pos;
            }
            self.edges.set(edge, Some(record));
        }
        Ok(())
    }

    /// Change a node's appearance in place
    ///
    /// Position changes are not propagated to edges, use
    /// [`move_node`](Self::move_node) for that. The deleted flag cannot be
    /// changed this way.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Other`] if `slot` is not a live node.
    pub fn update_node<F>(&mut self, slot: usize, f: F) -> Result<(), GraphError>
    where
        F: FnOnce(&mut NodeRecord),
    {
        self.check_node(slot)?;
        let mut record = self.nodes.record(slot);
        f(&mut record);
        record.flags &= !flags::DELETED;
        self.nodes.set(slot, Some(record));
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`GraphError::Other`] if `slot` is not a live element of `kind`.
    pub fn set_highlighted(&mut self, kind: BufferKind, slot: usize, on: bool) -> Result<(), GraphError> {
        match kind {
            BufferKind::Node => {
                self.check_node(slot)?;
                let mut record = self.nodes.record(slot);
                record.set_highlighted(on);
                self.nodes.set(slot, Some(record));
            }
            BufferKind::Edge => {
                self.check_edge(slot)?;
                let mut record = self.edges.record(slot);
                record.set_highlighted(on);
                self.edges.set(slot, Some(record));
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`GraphError::Other`] if `slot` is not a live edge.
    pub fn remove_edge(&mut self, slot: usize) -> Result<(), GraphError> {
        self.check_edge(slot)?;

        let ends = *self.edges.side(slot);
        for node in [ends.from, ends.to] {
            self.nodes.side_mut(node).adj_edges.retain(|&e| e != slot);
        }
        self.edges.set(slot, None);
        self.edge_attributes.clear_slot(slot);
        Ok(())
    }

    /// Remove a node together with every incident edge
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Other`] if `slot` is not a live node.
    pub fn remove_node(&mut self, slot: usize) -> Result<(), GraphError> {
        self.check_node(slot)?;

        let incident = std::mem::take(&mut self.nodes.side_mut(slot).adj_edges);
        debug!(node = slot, edges = incident.len(), "removing node");
        for edge in incident {
            self.remove_edge(edge)?;
        }
        self.nodes.set(slot, None);
        self.node_attributes.clear_slot(slot);
        Ok(())
    }

    /// Publish pending changes, nodes first
    pub fn flush_changes(&mut self) {
        self.nodes.flush_changes();
        self.edges.flush_changes();
    }

    /// Current bytes of one record array
    #[must_use]
    pub fn snapshot(&self, kind: BufferKind) -> SharedBuffer {
        match kind {
            BufferKind::Node => self.nodes.snapshot(),
            BufferKind::Edge => self.edges.snapshot(),
        }
    }

    fn check_node(&self, slot: usize) -> Result<(), GraphError> {
        if self.nodes.is_live(slot) {
            Ok(())
        } else {
            warn!(node = slot, "not a live node");
            Err(GraphError::other(format!("node {slot} does not exist")))
        }
    }

    fn check_edge(&self, slot: usize) -> Result<(), GraphError> {
        if self.edges.is_live(slot) {
            Ok(())
        } else {
            warn!(edge = slot, "not a live edge");
            Err(GraphError::other(format!("edge {slot} does not exist")))
        }
    }
}

/// Lock-protected graph with one outward event channel
pub struct Graph {
    lock: TaskLock<GraphData>,
    events: Emitter<GraphEvent>,
}

impl Graph {
    /// # Errors
    ///
    /// Returns [`GraphError::Other`] if the configuration is invalid.
    pub fn new(config: &GraphConfig) -> Result<Self, GraphError> {
        config.validate()?;

        let events = Emitter::new();
        let data = GraphData::new(config);
        data.nodes.updates().forward(&events, GraphEvent::clone);
        data.edges.updates().forward(&events, GraphEvent::clone);

        let lock = TaskLock::new(config.lock_name.clone(), data);
        lock.status_change()
            .forward(&events, |name| GraphEvent::TaskStatusChanged { name: name.clone() });

        debug!(lock = %config.lock_name, "graph created");
        Ok(Self { lock, events })
    }

    /// Channel every [`GraphEvent`] of this graph is published on
    ///
    /// Events are delivered on the thread that caused them, while that thread
    /// holds the lock. Handlers must not call back into the graph.
    #[must_use]
    pub fn events(&self) -> &Emitter<GraphEvent> {
        &self.events
    }

    #[must_use]
    pub fn lock(&self) -> &TaskLock<GraphData> {
        &self.lock
    }

    pub fn read(&self) -> ReadGuard<'_, GraphData> {
        self.lock.read()
    }

    /// # Errors
    ///
    /// Returns [`GraphError::Busy`] while a long task is running.
    pub fn write(&self) -> Result<WriteGuard<'_, GraphData>, GraphError> {
        self.lock.write()
    }

    /// # Errors
    ///
    /// Returns [`GraphError::Busy`] if another long task is running.
    pub fn lock_long(&self, task: &str) -> Result<LongGuard<'_, GraphData>, GraphError> {
        self.lock.lock_long(task)
    }

    /// # Errors
    ///
    /// Returns [`GraphError::Busy`] if the graph is locked in any way.
    pub fn try_lock_long(&self, task: &str) -> Result<LongGuard<'_, GraphData>, GraphError> {
        self.lock.try_lock_long(task)
    }

    /// Request cancellation of the running long task
    pub fn cancel(&self) -> bool {
        self.lock.cancel()
    }

    #[must_use]
    pub fn status(&self) -> LockStatus {
        self.lock.status()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("lock", &self.lock)
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeType;

    fn node(x: f32, y: f32) -> NodeRecord {
        NodeRecord::new([x, y], 2.0, [200, 200, 200])
    }

    fn triangle() -> (GraphData, [usize; 3], [usize; 3]) {
        let mut g = GraphData::new(&GraphConfig::default());
        let n = [g.add_node(node(0.0, 0.0)), g.add_node(node(1.0, 0.0)), g.add_node(node(0.0, 1.0))];
        let e = [
            g.add_edge(n[0], n[1], 1.0, [0; 3]).unwrap(),
            g.add_edge(n[1], n[2], 1.0, [0; 3]).unwrap(),
            g.add_edge(n[2], n[0], 1.0, [0; 3]).unwrap(),
        ];
        (g, n, e)
    }

    #[test]
    fn test_add_edge_copies_positions() {
        let (g, n, e) = triangle();
        let edge = g.edges().record(e[1]);
        assert_eq!(edge.from, [1.0, 0.0]);
        assert_eq!(edge.to, [0.0, 1.0]);
        assert_eq!(g.nodes().side(n[1]).adj_edges, vec![e[0], e[1]]);
        assert_eq!(*g.edges().side(e[2]), EdgeData { from: n[2], to: n[0] });
    }

    #[test]
    fn test_add_edge_rejects_dead_endpoint() {
        let (mut g, n, _) = triangle();
        g.remove_node(n[2]).unwrap();
        let err = g.add_edge(n[0], n[2], 1.0, [0; 3]).unwrap_err();
        assert_eq!(err, GraphError::other(format!("node {} does not exist", n[2])));
        assert!(g.add_edge(n[0], 99, 1.0, [0; 3]).is_err());
    }

    #[test]
    fn test_move_node_drags_edges() {
        let (mut g, n, e) = triangle();
        g.move_node(n[0], [5.0, 5.0]).unwrap();
        assert_eq!(g.nodes().record(n[0]).pos, [5.0, 5.0]);
        assert_eq!(g.edges().record(e[0]).from, [5.0, 5.0]);
        assert_eq!(g.edges().record(e[2]).to, [5.0, 5.0]);
        assert_eq!(g.edges().record(e[1]).from, [1.0, 0.0]);
    }

    #[test]
    fn test_remove_node_removes_incident_edges() {
        let (mut g, n, e) = triangle();
        g.node_attributes_mut()
            .create("label", AttributeType::Text)
            .unwrap()
            .set(n[0], "origin")
            .unwrap();

        g.remove_node(n[0]).unwrap();

        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
        assert!(g.edges().record(e[0]).is_deleted());
        assert!(g.edges().record(e[2]).is_deleted());
        assert_eq!(g.nodes().side(n[1]).adj_edges, vec![e[1]]);
        assert_eq!(g.nodes().side(n[2]).adj_edges, vec![e[1]]);
        assert!(g.node_attributes().table("label").unwrap().is_empty());
        assert!(g.remove_node(n[0]).is_err());
    }

    #[test]
    fn test_recycled_node_starts_without_edges() {
        let (mut g, n, _) = triangle();
        g.remove_node(n[1]).unwrap();
        let again = g.add_node(node(3.0, 3.0));
        assert_eq!(again, n[1]);
        assert!(g.nodes().side(again).adj_edges.is_empty());
        assert!(g.nodes().is_live(again));
        assert_eq!(g.nodes().side(again).generation, g.nodes().side(n[0]).generation + 1);
    }

    #[test]
    fn test_self_loop_listed_once() {
        let mut g = GraphData::new(&GraphConfig::default());
        let a = g.add_node(node(0.0, 0.0));
        let e = g.add_edge(a, a, 1.0, [0; 3]).unwrap();
        assert_eq!(g.nodes().side(a).adj_edges, vec![e]);
        g.remove_node(a).unwrap();
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_update_node_keeps_slot_live() {
        let (mut g, n, _) = triangle();
        g.update_node(n[2], |r| {
            r.radius = 9.0;
            r.mark_deleted();
        })
        .unwrap();
        assert_eq!(g.nodes().record(n[2]).radius, 9.0);
        assert!(g.nodes().is_live(n[2]));
    }

    #[test]
    fn test_highlight() {
        let (mut g, n, e) = triangle();
        g.set_highlighted(BufferKind::Node, n[0], true).unwrap();
        g.set_highlighted(BufferKind::Edge, e[0], true).unwrap();
        assert!(g.nodes().record(n[0]).is_highlighted());
        assert!(g.edges().record(e[0]).is_highlighted());
        assert!(g.set_highlighted(BufferKind::Edge, 42, true).is_err());
    }

    #[test]
    fn test_graph_forwards_store_and_status_events() {
        let graph = Graph::new(&GraphConfig::default()).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        graph.events().observe(move |e: &GraphEvent| tx.send(e.clone()).unwrap());

        graph.write().unwrap().add_node(node(0.0, 0.0));
        {
            let mut task = graph.lock_long("layout").unwrap();
            task.flush_changes();
        }

        let events: Vec<GraphEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], GraphEvent::BufferReplaced { kind: BufferKind::Node, .. }));
        assert!(matches!(&events[1], GraphEvent::TaskStatusChanged { name: Some(n) } if n == "layout"));
        assert!(matches!(events[2], GraphEvent::SlotUpdate { kind: BufferKind::Node, slot: 0, .. }));
        assert!(matches!(events[3], GraphEvent::TaskStatusChanged { name: None }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GraphConfig::default();
        config.nodes.block_size = 0;
        assert!(Graph::new(&config).is_err());
    }
}
