//! Optimistic change transaction: snapshot, apply locally, sync, commit or roll back.

use tracing::{debug, instrument, warn};

use crate::application::error::SyncFailure;
use crate::domain::{Change, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Snapshot taken, nothing applied yet
    Open,
    /// Local change applied, waiting for the store
    Pending,
}

/// How a transaction ended. Carries the state the caller should show next.
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome<S> {
    Committed(S),
    RolledBack { restored: S, failure: SyncFailure },
}

impl<S> TxOutcome<S> {
    pub fn is_committed(&self) -> bool {
        matches!(self, TxOutcome::Committed(_))
    }

    pub fn state(&self) -> &S {
        match self {
            TxOutcome::Committed(state) => state,
            TxOutcome::RolledBack { restored, .. } => restored,
        }
    }

    pub fn into_state(self) -> S {
        match self {
            TxOutcome::Committed(state) => state,
            TxOutcome::RolledBack { restored, .. } => restored,
        }
    }

    pub fn failure(&self) -> Option<&SyncFailure> {
        match self {
            TxOutcome::Committed(_) => None,
            TxOutcome::RolledBack { failure, .. } => Some(failure),
        }
    }
}

/// One optimistic edit of a tree or route snapshot.
#[derive(Debug)]
pub struct ChangeTransaction<S> {
    snapshot: S,
    pending: Option<S>,
    state: TxState,
}

impl<S: Clone> ChangeTransaction<S> {
    /// Capture an immutable snapshot of `current`.
    pub fn begin(current: &S) -> Self {
        Self {
            snapshot: current.clone(),
            pending: None,
            state: TxState::Open,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }

    /// Optimistic view: the pending state if one was applied, else the snapshot.
    pub fn current(&self) -> &S {
        self.pending.as_ref().unwrap_or(&self.snapshot)
    }

    /// Run a pure mutation against the current view and keep its result pending.
    ///
    /// A rejected mutation leaves the transaction as it was. Returns the store
    /// call to make, or `None` when the mutation changed nothing.
    #[instrument(level = "trace", skip(self, mutation))]
    pub fn apply_local<E, F>(&mut self, mutation: F) -> DomainResult<Option<E>>
    where
        F: FnOnce(&S) -> DomainResult<Change<S, E>>,
    {
        let Change { state, effect } = mutation(self.current())?;
        if effect.is_some() {
            self.pending = Some(state);
            self.state = TxState::Pending;
        }
        Ok(effect)
    }

    /// Call the store with the pending state and settle on its answer.
    pub fn commit<F>(self, sync: F) -> TxOutcome<S>
    where
        F: FnOnce(&S) -> Result<(), SyncFailure>,
    {
        if self.pending.is_none() {
            debug!("nothing pending, commit is a no-op");
            return self.settle(Ok(()));
        }
        let result = sync(self.current());
        self.settle(result)
    }

    /// Finish with an already known store answer.
    pub fn settle(self, result: Result<(), SyncFailure>) -> TxOutcome<S> {
        match result {
            Ok(()) => TxOutcome::Committed(self.pending.unwrap_or(self.snapshot)),
            Err(failure) => {
                warn!("rolling back: {}", failure);
                TxOutcome::RolledBack {
                    restored: self.snapshot,
                    failure,
                }
            }
        }
    }
}
