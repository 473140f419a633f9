//! Record store CLI demo
//!
//! Reads commands from stdin, applies them to a node store and prints the
//! events every flush publishes. Run with `RUST_LOG=debug` to see the store's
//! own logging.
//!
//! ```text
//! add <x> <y>       allocate a node
//! set <slot> <x> <y>
//! del <slot>
//! flush
//! ```

use graphsync::config::StoreConfig;
use graphsync::{GraphEvent, NodeData, NodeRecord, RecordStore};
use std::io::{self, BufRead};

fn describe(event: &GraphEvent) -> String {
    match event {
        GraphEvent::BufferReplaced { kind, capacity, buffer } => {
            format!("{kind:?} replaced: capacity {capacity} ({} bytes)", buffer.len_bytes())
        }
        GraphEvent::RangeUpdate { kind, start, end, .. } => format!("{kind:?} range {start}..{end}"),
        GraphEvent::SlotUpdate { kind, slot, buffer } => {
            let record: NodeRecord = buffer.read(*slot);
            format!("{kind:?} slot {slot}: {record:?}")
        }
        GraphEvent::TaskStatusChanged { name } => format!("task status: {name:?}"),
    }
}

fn parse<T: std::str::FromStr>(arg: Option<&str>) -> Result<T, String> {
    let arg = arg.ok_or("missing argument")?;
    arg.parse().map_err(|_| format!("invalid argument: {arg}"))
}

fn run(store: &mut RecordStore<NodeRecord, NodeData>, line: &str) -> Result<(), String> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("add") => {
            let pos = [parse(words.next())?, parse(words.next())?];
            let slot = store.add(1);
            store.set(slot, Some(NodeRecord::new(pos, 1.0, [255, 255, 255])));
            println!("added slot {slot}");
        }
        Some("set") => {
            let slot: usize = parse(words.next())?;
            if !store.is_live(slot) {
                return Err(format!("slot {slot} is not live"));
            }
            let mut record = store.record(slot);
            record.pos = [parse(words.next())?, parse(words.next())?];
            store.set(slot, Some(record));
        }
        Some("del") => {
            let slot: usize = parse(words.next())?;
            if slot >= store.len() {
                return Err(format!("slot {slot} was never allocated"));
            }
            store.set(slot, None);
        }
        Some("flush") => store.flush_changes(),
        Some(other) => return Err(format!("unknown command: {other}")),
        None => {}
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = StoreConfig {
        block_size: 16,
        max_modified: 4,
    };
    config.validate()?;

    let mut store = RecordStore::<NodeRecord, NodeData>::new(config);
    store.updates().observe(|event| println!("  -> {}", describe(event)));

    println!("Commands: add <x> <y> | set <slot> <x> <y> | del <slot> | flush (empty line to quit)");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }
        if let Err(e) = run(&mut store, &line) {
            eprintln!("Error: {e}");
        }
    }

    store.flush_changes();
    println!(
        "{} live slots, capacity {}, {} free",
        store.live_count(),
        store.capacity(),
        store.free_count()
    );
    Ok(())
}
