//! Tick-driven animations
//!
//! An [`AnimationSet`] holds in-flight animations and advances all of them
//! by the same time step on every [`tick`](AnimationSet::tick). The set does
//! not own the state it animates: progress functions receive a `&mut C`
//! context on each tick, typically the graph data borrowed from a write
//! section.
//!
//! ```
//! use graphsync::animation::AnimationSet;
//!
//! let mut radius = 0.0;
//! let mut set = AnimationSet::new();
//! set.add(1.0, |r: &mut f64, t| {
//!     *r = 10.0 * t;
//!     true
//! });
//!
//! set.tick(&mut radius, 0.5);
//! assert_eq!(radius, 5.0);
//! set.tick(&mut radius, 0.75);
//! assert_eq!(radius, 10.0);
//! assert!(set.is_empty());
//! ```

use std::fmt;

type Progress<C> = Box<dyn FnMut(&mut C, f64) -> bool + Send>;
type OnEnd<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Identifies an animation for [`AnimationSet::cancel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimationId(u64);

struct Animation<C> {
    id: AnimationId,
    elapsed: f64,
    duration: f64,
    progress: Progress<C>,
    on_end: Option<OnEnd<C>>,
}

pub struct AnimationSet<C> {
    current: Vec<Animation<C>>,
    next_id: u64,
}

impl<C> Default for AnimationSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for AnimationSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationSet")
            .field("running", &self.current.len())
            .finish()
    }
}

impl<C> AnimationSet<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Vec::new(),
            next_id: 0,
        }
    }

    /// Start an animation lasting `duration` time units
    ///
    /// `progress` is called on every tick with the clamped elapsed time and
    /// returns `false` to finish early.
    pub fn add<F>(&mut self, duration: f64, progress: F) -> AnimationId
    where
        F: FnMut(&mut C, f64) -> bool + Send + 'static,
    {
        self.push(duration, Box::new(progress), None)
    }

    /// Like [`add`](Self::add), running `on_end` once the animation finishes
    pub fn add_with_end<F, E>(&mut self, duration: f64, progress: F, on_end: E) -> AnimationId
    where
        F: FnMut(&mut C, f64) -> bool + Send + 'static,
        E: FnOnce(&mut C) + Send + 'static,
    {
        self.push(duration, Box::new(progress), Some(Box::new(on_end)))
    }

    fn push(&mut self, duration: f64, progress: Progress<C>, on_end: Option<OnEnd<C>>) -> AnimationId {
        let id = AnimationId(self.next_id);
        self.next_id += 1;
        self.current.push(Animation {
            id,
            elapsed: 0.0,
            duration,
            progress,
            on_end,
        });
        id
    }

    /// Advance every animation by `dt`, in insertion order
    ///
    /// An animation is removed, after its end callback ran, once its elapsed
    /// time exceeds its duration or its progress function returned `false`.
    pub fn tick(&mut self, ctx: &mut C, dt: f64) {
        let before = self.current.len();
        self.current.retain_mut(|anim| {
            anim.elapsed += dt;
            let keep_going = (anim.progress)(ctx, anim.elapsed.min(anim.duration));
            if anim.elapsed > anim.duration || !keep_going {
                if let Some(on_end) = anim.on_end.take() {
                    on_end(ctx);
                }
                return false;
            }
            true
        });
        let finished = before - self.current.len();
        if finished > 0 {
            log::trace!("animation.tick({dt}): {finished} finished, {} running", self.current.len());
        }
    }

    /// Remove an animation without running its end callback
    ///
    /// Returns whether the animation was still running.
    pub fn cancel(&mut self, id: AnimationId) -> bool {
        let before = self.current.len();
        self.current.retain(|anim| anim.id != id);
        before != self.current.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}
