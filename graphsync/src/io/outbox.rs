//! Sync-to-async bridge for boundary events
//!
//! The graph emits events synchronously on whichever thread holds its lock.
//! The [`Outbox`] is registered as the emitter's sink and moves every event
//! into an unbounded tokio channel, so the mutator never blocks on the
//! consumer and the consumer can `await` events in emission order.

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::emitter::{Emitter, EmitterError};

pub struct Outbox;

impl Outbox {
    /// Register the sink of `emitter` and return the receiving end
    ///
    /// Once the receiver is dropped, further events are discarded with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`EmitterError::SinkAlreadyRegistered`] if the emitter already
    /// has a sink.
    pub fn attach<T>(emitter: &Emitter<T>) -> Result<mpsc::UnboundedReceiver<T>, EmitterError>
    where
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut closed = false;
        emitter.sink(move |event: T| {
            if closed {
                return;
            }
            if tx.send(event).is_err() {
                warn!("outbox receiver dropped, discarding events");
                closed = true;
            } else {
                trace!("outbox: event queued");
            }
        })?;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let emitter: Emitter<u32> = Emitter::new();
        let mut rx = Outbox::attach(&emitter).unwrap();

        let producer = emitter.clone();
        std::thread::spawn(move || {
            for i in 0..5 {
                producer.emit(i);
            }
        })
        .join()
        .unwrap();

        let mut seen = Vec::new();
        while let Ok(v) = rx.try_recv() {
            seen.push(v);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_second_attach_fails() {
        let emitter: Emitter<u32> = Emitter::new();
        let _rx = Outbox::attach(&emitter).unwrap();
        assert_eq!(
            Outbox::attach(&emitter).err(),
            Some(EmitterError::SinkAlreadyRegistered)
        );
    }

    #[test]
    fn test_dropped_receiver_does_not_block() {
        let emitter: Emitter<u32> = Emitter::new();
        drop(Outbox::attach(&emitter).unwrap());
        emitter.emit(1);
        emitter.emit(2);
    }
}
