//! Per-instance serialization of optimistic edits.
//!
//! At most one transaction is in flight per tree or route. Mutations that
//! arrive while the store call is outstanding wait in a FIFO and are applied,
//! in order, to whatever state the in-flight call leaves behind.

use std::collections::VecDeque;

use tracing::{debug, info, instrument, warn};

use crate::application::error::SyncFailure;
use crate::application::transaction::{ChangeTransaction, TxOutcome};
use crate::domain::{Change, DomainError, DomainResult};

/// A pure mutation waiting to be applied.
pub type Mutation<S, E> = Box<dyn FnOnce(&S) -> DomainResult<Change<S, E>>>;

/// What happened to a submitted mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission<E> {
    /// Applied locally; the caller must sync this effect and then `resolve`.
    Started(E),
    /// Valid but nothing to persist
    Unchanged,
    /// Buffered behind the in-flight transaction (1-based queue position)
    Queued { position: usize },
}

/// Result of resolving the in-flight transaction.
#[derive(Debug)]
pub struct Resolution<S, E> {
    pub outcome: TxOutcome<S>,
    /// Effect of the next buffered mutation, now in flight
    pub next: Option<E>,
    /// Buffered mutations rejected when finally applied
    pub dropped: Vec<DomainError>,
}

pub struct EditSession<S, E> {
    committed: S,
    in_flight: Option<(ChangeTransaction<S>, E)>,
    queue: VecDeque<Mutation<S, E>>,
}

impl<S: Clone, E: Clone> EditSession<S, E> {
    pub fn new(state: S) -> Self {
        Self {
            committed: state,
            in_flight: None,
            queue: VecDeque::new(),
        }
    }

    /// State to display: includes the optimistic in-flight change.
    pub fn current(&self) -> &S {
        match &self.in_flight {
            Some((tx, _)) => tx.current(),
            None => &self.committed,
        }
    }

    /// Last state the store acknowledged.
    pub fn committed(&self) -> &S {
        &self.committed
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_effect(&self) -> Option<&E> {
        self.in_flight.as_ref().map(|(_, effect)| effect)
    }

    /// Apply `mutation` now, or buffer it if a store call is outstanding.
    ///
    /// Domain errors are returned immediately and leave the session untouched.
    #[instrument(level = "debug", skip(self, mutation))]
    pub fn submit<F>(&mut self, mutation: F) -> DomainResult<Submission<E>>
    where
        F: FnOnce(&S) -> DomainResult<Change<S, E>> + 'static,
    {
        if self.in_flight.is_some() {
            self.queue.push_back(Box::new(mutation));
            debug!("mutation queued at position {}", self.queue.len());
            return Ok(Submission::Queued {
                position: self.queue.len(),
            });
        }
        self.start(Box::new(mutation))
    }

    fn start(&mut self, mutation: Mutation<S, E>) -> DomainResult<Submission<E>> {
        let mut tx = ChangeTransaction::begin(&self.committed);
        match tx.apply_local(mutation)? {
            Some(effect) => {
                self.in_flight = Some((tx, effect.clone()));
                Ok(Submission::Started(effect))
            }
            None => Ok(Submission::Unchanged),
        }
    }

    /// Settle the in-flight transaction with the store's answer.
    ///
    /// Returns `None` if nothing was in flight.
    pub fn resolve(&mut self, result: Result<(), SyncFailure>) -> Option<Resolution<S, E>> {
        self.resolve_with(result, |state| state)
    }

    /// Like `resolve`, but on success passes the committed state through
    /// `reconcile` first (e.g. to swap provisional ids for assigned ones).
    #[instrument(level = "debug", skip(self, result, reconcile))]
    pub fn resolve_with<R>(&mut self, result: Result<(), SyncFailure>, reconcile: R) -> Option<Resolution<S, E>>
    where
        R: FnOnce(S) -> S,
    {
        let (tx, _) = self.in_flight.take()?;
        let outcome = match tx.settle(result) {
            TxOutcome::Committed(state) => TxOutcome::Committed(reconcile(state)),
            rolled_back => rolled_back,
        };
        match &outcome {
            TxOutcome::Committed(_) => info!("change committed"),
            TxOutcome::RolledBack { failure, .. } => warn!("change rolled back: {}", failure),
        }
        self.committed = outcome.state().clone();

        let mut dropped = Vec::new();
        let next = self.start_next(&mut dropped);
        Some(Resolution {
            outcome,
            next,
            dropped,
        })
    }

    // Drain buffered mutations until one needs a store call.
    fn start_next(&mut self, dropped: &mut Vec<DomainError>) -> Option<E> {
        while let Some(mutation) = self.queue.pop_front() {
            match self.start(mutation) {
                Ok(Submission::Started(effect)) => return Some(effect),
                Ok(_) => continue,
                Err(e) => {
                    warn!("queued mutation rejected: {}", e);
                    dropped.push(e);
                }
            }
        }
        None
    }
}
