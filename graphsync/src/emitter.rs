//! Typed synchronous publish/subscribe channel
//!
//! An [`Emitter`] delivers every emitted value to:
//!
//! 1. all observers, in registration order, by reference;
//! 2. then the sink, if one is registered, by value.
//!
//! The sink is the single terminal consumer that takes ownership of the
//! value, typically to forward it out of the process (see
//! [`Outbox`](crate::io::Outbox)). At most one sink can be registered.
//!
//! Delivery happens on the thread that calls [`Emitter::emit`]. There is no
//! queue inside the channel.
//!
//! # Reentrancy
//!
//! The subscription table is protected by a `parking_lot::Mutex` that is held
//! during delivery. A handler must not emit into, or subscribe to, the same
//! emitter it is called from: the mutex is not reentrant and this deadlocks.
//! Emitting into a *different* emitter (see [`Emitter::forward`]) is fine.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Error type for subscription operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitterError {
    #[error("emitter already has a sink")]
    SinkAlreadyRegistered,
}

impl From<EmitterError> for crate::GraphError {
    fn from(e: EmitterError) -> Self {
        crate::GraphError::Other(e.to_string())
    }
}

type Observer<T> = Box<dyn Fn(&T) + Send + Sync>;
type Sink<T> = Box<dyn FnMut(T) + Send>;

struct Handlers<T> {
    observers: Vec<Observer<T>>,
    sink: Option<Sink<T>>,
}

/// Synchronous event channel with many observers and at most one sink
///
/// Clones share the same subscription table, so a clone can be handed to a
/// producer while the first handle is used to subscribe.
pub struct Emitter<T> {
    handlers: Arc<Mutex<Handlers<T>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.lock();
        f.debug_struct("Emitter")
            .field("observers", &handlers.observers.len())
            .field("has_sink", &handlers.sink.is_some())
            .finish()
    }
}

impl<T> Emitter<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(Handlers {
                observers: Vec::new(),
                sink: None,
            })),
        }
    }

    /// Register an observer that borrows every emitted value
    pub fn observe<F>(&self, observer: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.handlers.lock().observers.push(Box::new(observer));
    }

    /// Register the terminal sink that receives every value by move
    ///
    /// # Errors
    ///
    /// Returns [`EmitterError::SinkAlreadyRegistered`] if a sink exists.
    /// The existing sink is kept.
    pub fn sink<F>(&self, sink: F) -> Result<(), EmitterError>
    where
        F: FnMut(T) + Send + 'static,
    {
        let mut handlers = self.handlers.lock();
        if handlers.sink.is_some() {
            log::warn!("emitter.sink: rejecting second sink registration");
            return Err(EmitterError::SinkAlreadyRegistered);
        }
        handlers.sink = Some(Box::new(sink));
        Ok(())
    }

    #[must_use]
    pub fn has_sink(&self) -> bool {
        self.handlers.lock().sink.is_some()
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.handlers.lock().observers.len()
    }

    /// Deliver `value` to all observers, then move it into the sink
    pub fn emit(&self, value: T) {
        let mut handlers = self.handlers.lock();
        for observer in &handlers.observers {
            observer(&value);
        }
        if let Some(sink) = handlers.sink.as_mut() {
            sink(value);
        }
    }
}

impl<T: Clone> Emitter<T> {
    /// Deliver a borrowed value; the sink, if any, receives a clone
    pub fn emit_ref(&self, value: &T) {
        let mut handlers = self.handlers.lock();
        for observer in &handlers.observers {
            observer(value);
        }
        if let Some(sink) = handlers.sink.as_mut() {
            sink(value.clone());
        }
    }
}

impl<T: 'static> Emitter<T> {
    /// Pipe every value of this emitter, transformed by `f`, into `target`
    pub fn forward<R, F>(&self, target: &Emitter<R>, f: F)
    where
        R: 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let target = target.clone();
        self.observe(move |value| target.emit(f(value)));
    }

    /// Derive a new emitter whose values are `f` applied to this one's
    #[must_use]
    pub fn map<R, F>(&self, f: F) -> Emitter<R>
    where
        R: 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let derived = Emitter::new();
        self.forward(&derived, f);
        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_observers_run_in_registration_order_before_sink() {
        let emitter = Emitter::new();
        let (tx, rx) = mpsc::channel();

        let tx1 = tx.clone();
        emitter.observe(move |v: &i32| tx1.send(format!("first {v}")).unwrap());
        let tx2 = tx.clone();
        emitter.observe(move |v: &i32| tx2.send(format!("second {v}")).unwrap());
        emitter
            .sink(move |v: i32| tx.send(format!("sink {v}")).unwrap())
            .unwrap();

        emitter.emit(7);

        let seen: Vec<String> = rx.try_iter().collect();
        assert_eq!(seen, vec!["first 7", "second 7", "sink 7"]);
    }

    #[test]
    fn test_second_sink_is_rejected() {
        let emitter: Emitter<u8> = Emitter::new();
        emitter.sink(|_| {}).unwrap();
        assert_eq!(emitter.sink(|_| {}), Err(EmitterError::SinkAlreadyRegistered));
        assert!(emitter.has_sink());
    }

    #[test]
    fn test_sink_takes_ownership() {
        let emitter: Emitter<Vec<u8>> = Emitter::new();
        let (tx, rx) = mpsc::channel();
        emitter.sink(move |v| tx.send(v).unwrap()).unwrap();

        emitter.emit(vec![1, 2, 3]);
        emitter.emit_ref(&vec![4]);

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![vec![1, 2, 3], vec![4]]);
    }

    #[test]
    fn test_clone_shares_subscriptions() {
        let emitter: Emitter<u32> = Emitter::new();
        let producer = emitter.clone();
        let (tx, rx) = mpsc::channel();
        emitter.observe(move |v| tx.send(*v).unwrap());

        producer.emit(1);
        producer.emit(2);

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(emitter.observer_count(), 1);
    }

    #[test]
    fn test_map_derives_values() {
        let emitter: Emitter<u32> = Emitter::new();
        let doubled = emitter.map(|v| v * 2);
        let (tx, rx) = mpsc::channel();
        doubled.sink(move |v| tx.send(v).unwrap()).unwrap();

        emitter.emit(21);

        assert_eq!(rx.try_recv().unwrap(), 42);
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let emitter: Emitter<String> = Emitter::new();
        emitter.emit("nobody listens".to_string());
        assert!(!emitter.has_sink());
    }
}
