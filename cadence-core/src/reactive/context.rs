//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a memo or effect), we push
//! the subscriber onto the stack. When the computation completes, we pop it.
//! Only the top of the stack is ever "current"; the entries below it are the
//! saved contexts to restore.
//!
//! Nesting is a supported pattern: an effect that reads a stale memo causes
//! the memo to recompute in the middle of the effect's body, and the memo's
//! reads must be attributed to the memo, not to the effect.
//!
//! An entry may also carry no subscriber at all. That is how [`untrack`]
//! suspends tracking for a scope.
//!
//! [`untrack`]: super::untrack

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::node::NodeId;
use super::subscriber::{Reactive, Source};

/// Sources read by one run of a computation, in first-read order.
pub(crate) type Dependencies = SmallVec<[Rc<dyn Source>; 4]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The computation reads are attributed to. `None` for untracked scopes.
    subscriber: Option<(NodeId, Weak<dyn Reactive>)>,
    /// Sources read so far in this run, deduplicated.
    dependencies: Dependencies,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<NodeId>,
    exited: bool,
}

impl ReactiveContext {
    /// Enter a tracked context for the given computation.
    pub(crate) fn enter(subscriber_id: NodeId, subscriber: Weak<dyn Reactive>) -> Self {
        Self::push(Some((subscriber_id, subscriber)))
    }

    /// Enter a scope in which reads are not tracked.
    ///
    /// The scope ends when the returned guard is dropped.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(subscriber: Option<(NodeId, Weak<dyn Reactive>)>) -> Self {
        let subscriber_id = subscriber.as_ref().map(|(id, _)| *id);
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber,
                dependencies: Dependencies::new(),
            });
        });

        Self {
            subscriber_id,
            exited: false,
        }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.subscriber.as_ref().map(|(id, _)| *id))
        })
    }

    /// How many contexts are on the stack, tracked or not.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Record a read of `source` by the current computation.
    ///
    /// Subscribes the computation to the source right away and remembers the
    /// source so the computation can prune stale subscriptions once it
    /// finishes. Repeated reads of the same source in one run are recorded
    /// once.
    pub(crate) fn track(source: &Rc<dyn Source>) {
        let source_id = source.node_id();
        let subscriber = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let (id, weak) = entry.subscriber.as_ref()?;
            if !entry
                .dependencies
                .iter()
                .any(|dep| dep.node_id() == source_id)
            {
                entry.dependencies.push(Rc::clone(source));
            }
            Some((*id, weak.clone()))
        });

        if let Some((id, weak)) = subscriber {
            source.add_subscriber(id, weak);
        }
    }

    /// Leave the context and hand back the sources read inside it.
    pub(crate) fn exit(mut self) -> Dependencies {
        self.exited = true;
        self.pop()
    }

    fn pop(&self) -> Dependencies {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            match popped {
                Some(entry) => {
                    // Verify we're popping the right context.
                    let popped_id = entry.subscriber.as_ref().map(|(id, _)| *id);
                    debug_assert_eq!(
                        popped_id, self.subscriber_id,
                        "ReactiveContext mismatch: expected {:?}, got {:?}",
                        self.subscriber_id, popped_id
                    );
                    entry.dependencies
                }
                None => Dependencies::new(),
            }
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.exited {
            self.pop();
        }
    }
}
