//! Highlight effects driven by an [`AnimationSet`]

use std::f64::consts::PI;

use graphsync::animation::{AnimationId, AnimationSet};
use graphsync::{BufferKind, GraphData, Record};
use tracing::debug;

fn same_node(data: &GraphData, slot: usize, generation: u64) -> bool {
    data.nodes().is_live(slot) && data.nodes().side(slot).generation == generation
}

/// Highlight the node in `slot` and pulse its radius for `duration` seconds
///
/// The radius grows to 1.5 times its size and back. The highlight is removed
/// when the pulse ends. If the node is removed meanwhile, the animation
/// finishes on the next tick and leaves whatever node later takes the slot
/// alone. Returns `None` if `slot` holds no node.
pub fn pulse(effects: &mut AnimationSet<GraphData>, data: &GraphData, slot: usize, duration: f64) -> Option<AnimationId> {
    if !data.nodes().is_live(slot) {
        return None;
    }
    let generation = data.nodes().side(slot).generation;
    let base = data.nodes().record(slot).radius;

    let id = effects.add_with_end(
        duration,
        move |data: &mut GraphData, t| {
            if !same_node(data, slot, generation) {
                return false;
            }
            #[allow(clippy::cast_possible_truncation)]
            let scale = 1.0 + 0.5 * (PI * t / duration).sin() as f32;
            data.update_node(slot, |r| {
                r.radius = base * scale;
                r.set_highlighted(true);
            })
            .is_ok()
        },
        move |data| {
            if !same_node(data, slot, generation) {
                debug!(node = slot, "pulse ended on a removed node");
                return;
            }
            if let Err(e) = data.set_highlighted(BufferKind::Node, slot, false) {
                debug!(node = slot, error = %e, "pulse could not clear highlight");
            }
        },
    );
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsync::config::GraphConfig;
    use graphsync::{NodeRecord, Record};

    #[test]
    fn test_pulse_restores_radius() {
        let mut data = GraphData::new(&GraphConfig::default());
        let slot = data.add_node(NodeRecord::new([0.0, 0.0], 2.0, [0; 3]));
        let mut effects = AnimationSet::new();
        pulse(&mut effects, &data, slot, 1.0).unwrap();

        effects.tick(&mut data, 0.5);
        let mid = data.nodes().record(slot);
        assert!((mid.radius - 3.0).abs() < 1e-4, "radius {}", mid.radius);
        assert!(mid.is_highlighted());

        effects.tick(&mut data, 0.6);
        let done = data.nodes().record(slot);
        assert!((done.radius - 2.0).abs() < 1e-4, "radius {}", done.radius);
        assert!(!done.is_highlighted());
        assert!(effects.is_empty());
    }

    #[test]
    fn test_pulse_stops_when_node_removed() {
        let mut data = GraphData::new(&GraphConfig::default());
        let slot = data.add_node(NodeRecord::default());
        let mut effects = AnimationSet::new();
        pulse(&mut effects, &data, slot, 10.0).unwrap();

        data.remove_node(slot).unwrap();
        effects.tick(&mut data, 0.1);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_pulse_leaves_recycled_slot_alone() {
        let mut data = GraphData::new(&GraphConfig::default());
        let slot = data.add_node(NodeRecord::new([0.0, 0.0], 2.0, [0; 3]));
        let mut effects = AnimationSet::new();
        pulse(&mut effects, &data, slot, 1.0).unwrap();
        effects.tick(&mut data, 0.25);

        data.remove_node(slot).unwrap();
        let mut other = NodeRecord::new([5.0, 5.0], 4.0, [9; 3]);
        other.set_highlighted(true);
        assert_eq!(data.add_node(other), slot);

        effects.tick(&mut data, 0.25);
        assert!(effects.is_empty());
        let now = data.nodes().record(slot);
        assert!((now.radius - 4.0).abs() < f32::EPSILON, "radius {}", now.radius);
        assert!(now.is_highlighted());
    }

    #[test]
    fn test_pulse_needs_a_live_node() {
        let mut data = GraphData::new(&GraphConfig::default());
        let slot = data.add_node(NodeRecord::default());
        data.remove_node(slot).unwrap();
        let mut effects = AnimationSet::new();
        assert!(pulse(&mut effects, &data, slot, 1.0).is_none());
        assert!(effects.is_empty());
    }
}
