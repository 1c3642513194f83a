//! Per-resource state tracking.
//!
//! Every GPU resource category a renderable owns (a vertex buffer, its
//! descriptor sets, its pipelines...) carries a [`ResourceTracker`]. Requests
//! only ever raise the severity of pending work; the only way back to
//! [`ResourceState::Clean`] is [`ResourceTracker::complete`] with the
//! [`PendingWork`] token handed out by [`ResourceTracker::pending`].

use std::fmt;

/// How much work a resource needs before it can be drawn.
///
/// Ordered by severity, so escalation is `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ResourceState {
    #[default]
    Clean,
    /// The resource exists but its contents are stale.
    NeedsUpdate,
    /// The resource must be destroyed and created again.
    NeedsRebuild,
}

/// Proof that the holder observed pending work on a tracker.
///
/// Not `Clone`: a token is consumed by [`ResourceTracker::complete`].
#[derive(Debug, PartialEq, Eq)]
pub struct PendingWork {
    level: ResourceState,
}

impl PendingWork {
    /// True when the resource must be recreated rather than refreshed.
    pub fn is_rebuild(&self) -> bool {
        self.level == ResourceState::NeedsRebuild
    }

    /// The severity observed.
    pub const fn level(&self) -> ResourceState {
        self.level
    }
}

#[derive(Debug, Clone, Copy)]
enum Event {
    RequestUpdate,
    RequestRebuild,
    Complete(ResourceState),
}

/// The transition table.
const fn transition(from: ResourceState, event: Event) -> ResourceState {
    use ResourceState::{Clean, NeedsRebuild, NeedsUpdate};

    match (from, event) {
        (Clean | NeedsUpdate, Event::RequestUpdate) => NeedsUpdate,
        (NeedsRebuild, Event::RequestUpdate) => NeedsRebuild,
        (_, Event::RequestRebuild) => NeedsRebuild,
        // Work finished at the observed level; anything requested since at
        // a higher severity survives.
        (NeedsRebuild, Event::Complete(NeedsUpdate | Clean)) => NeedsRebuild,
        (NeedsUpdate, Event::Complete(Clean)) => NeedsUpdate,
        (_, Event::Complete(_)) => Clean,
    }
}

/// State machine for one resource category.
#[derive(Clone)]
pub struct ResourceTracker {
    name: &'static str,
    state: ResourceState,
}

impl ResourceTracker {
    /// A tracker with nothing pending.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            state: ResourceState::Clean,
        }
    }

    /// A tracker for a resource that does not exist yet.
    pub const fn needs_rebuild(name: &'static str) -> Self {
        Self {
            name,
            state: ResourceState::NeedsRebuild,
        }
    }

    pub const fn state(&self) -> ResourceState {
        self.state
    }

    pub fn is_clean(&self) -> bool {
        self.state == ResourceState::Clean
    }

    /// Mark the contents stale. Has no effect on a resource awaiting rebuild.
    pub fn request_update(&mut self) {
        self.apply(Event::RequestUpdate);
    }

    /// Mark the resource for recreation.
    pub fn request_rebuild(&mut self) {
        self.apply(Event::RequestRebuild);
    }

    /// The work currently pending, if any.
    pub fn pending(&self) -> Option<PendingWork> {
        match self.state {
            ResourceState::Clean => None,
            level => Some(PendingWork { level }),
        }
    }

    /// Mark the observed work as done.
    pub fn complete(&mut self, work: PendingWork) {
        self.apply(Event::Complete(work.level));
    }

    fn apply(&mut self, event: Event) {
        let next = transition(self.state, event);
        if next != self.state {
            tracing::trace!("{}: {:?} -> {:?} ({:?})", self.name, self.state, next, event);
            self.state = next;
        }
    }
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.name, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_round_trip() {
        let mut tracker = ResourceTracker::new("vertices");
        assert!(tracker.pending().is_none());

        tracker.request_update();
        assert_eq!(tracker.state(), ResourceState::NeedsUpdate);

        let work = tracker.pending().unwrap();
        assert!(!work.is_rebuild());
        tracker.complete(work);
        assert!(tracker.is_clean());
    }

    #[test]
    fn rebuild_is_not_downgraded_by_update() {
        let mut tracker = ResourceTracker::new("pipelines");
        tracker.request_rebuild();
        tracker.request_update();
        assert_eq!(tracker.state(), ResourceState::NeedsRebuild);

        let work = tracker.pending().unwrap();
        assert!(work.is_rebuild());
        tracker.complete(work);
        assert!(tracker.is_clean());
    }

    #[test]
    fn escalation_during_update_survives_completion() {
        let mut tracker = ResourceTracker::new("descriptor sets");
        tracker.request_update();
        let work = tracker.pending().unwrap();

        // Something asked for a rebuild while the update was in progress
        tracker.request_rebuild();
        tracker.complete(work);
        assert_eq!(tracker.state(), ResourceState::NeedsRebuild);
    }

    #[test]
    fn severity_is_ordered() {
        assert!(ResourceState::Clean < ResourceState::NeedsUpdate);
        assert!(ResourceState::NeedsUpdate < ResourceState::NeedsRebuild);
    }

    #[test]
    fn transition_table_never_lowers_on_request() {
        let states = [
            ResourceState::Clean,
            ResourceState::NeedsUpdate,
            ResourceState::NeedsRebuild,
        ];
        for state in states {
            assert!(transition(state, Event::RequestUpdate) >= state);
            assert_eq!(
                transition(state, Event::RequestRebuild),
                ResourceState::NeedsRebuild
            );
        }
    }
}
