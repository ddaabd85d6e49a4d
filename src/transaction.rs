//! Optional transaction coordination around DML handlers.
//!
//! A transaction identifier is an opaque, globally unique string.  The
//! state machine is `Active -> {Committed, Aborted}`; commit and rollback
//! are idempotent, and crossing terminal states (commit after rollback or
//! the reverse) is a precondition failure.
//!
//! The server never requires a coordinator: when none is configured,
//! `create_transaction` fails with "unimplemented" and DML calls carrying
//! an inbound transaction ID simply proceed uncoordinated.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::Future;
use uuid::Uuid;

use crate::catalog::RequestContext;
use crate::error::AirportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        }
    }
}

#[async_trait]
pub trait TransactionCoordinator: Send + Sync {
    /// Open a new transaction and return its identifier.
    async fn begin(&self, ctx: &RequestContext) -> Result<String, AirportError>;

    /// Commit; idempotent on an already-committed transaction.
    async fn commit(&self, ctx: &RequestContext, transaction_id: &str) -> Result<(), AirportError>;

    /// Roll back; idempotent on an already-aborted transaction.
    async fn rollback(
        &self,
        ctx: &RequestContext,
        transaction_id: &str,
    ) -> Result<(), AirportError>;

    /// Current state, or `None` for an unknown identifier.
    async fn status(
        &self,
        ctx: &RequestContext,
        transaction_id: &str,
    ) -> Result<Option<TransactionState>, AirportError>;
}

// ---------------------------------------------------------------------------
// In-memory coordinator
// ---------------------------------------------------------------------------

/// Coordinator keeping transaction state in a process-local map.  Backends
/// with their own transaction machinery supply their own implementation;
/// this one is enough for single-process servers and for tests.
#[derive(Default)]
pub struct MemoryTransactionCoordinator {
    transactions: Mutex<HashMap<String, TransactionState>>,
}

impl MemoryTransactionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(
        &self,
        transaction_id: &str,
        target: TransactionState,
    ) -> Result<(), AirportError> {
        let mut transactions = self
            .transactions
            .lock()
            .map_err(|_| AirportError::internal("transaction map lock poisoned"))?;

        let state = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| {
                AirportError::not_found(format!("unknown transaction '{transaction_id}'"))
            })?;

        match (*state, target) {
            (TransactionState::Active, _) => {
                *state = target;
                Ok(())
            }
            (current, wanted) if current == wanted => Ok(()),
            (current, wanted) => Err(AirportError::failed_precondition(format!(
                "transaction '{transaction_id}' is {} and cannot become {}",
                current.as_str(),
                wanted.as_str()
            ))),
        }
    }
}

#[async_trait]
impl TransactionCoordinator for MemoryTransactionCoordinator {
    async fn begin(&self, _ctx: &RequestContext) -> Result<String, AirportError> {
        let id = Uuid::new_v4().to_string();
        let mut transactions = self
            .transactions
            .lock()
            .map_err(|_| AirportError::internal("transaction map lock poisoned"))?;
        transactions.insert(id.clone(), TransactionState::Active);
        Ok(id)
    }

    async fn commit(
        &self,
        _ctx: &RequestContext,
        transaction_id: &str,
    ) -> Result<(), AirportError> {
        self.transition(transaction_id, TransactionState::Committed)
    }

    async fn rollback(
        &self,
        _ctx: &RequestContext,
        transaction_id: &str,
    ) -> Result<(), AirportError> {
        self.transition(transaction_id, TransactionState::Aborted)
    }

    async fn status(
        &self,
        _ctx: &RequestContext,
        transaction_id: &str,
    ) -> Result<Option<TransactionState>, AirportError> {
        let transactions = self
            .transactions
            .lock()
            .map_err(|_| AirportError::internal("transaction map lock poisoned"))?;
        Ok(transactions.get(transaction_id).copied())
    }
}

// ---------------------------------------------------------------------------
// Handler wrapper
// ---------------------------------------------------------------------------

/// Run a DML handler inside the commit/rollback contract.
///
/// With no coordinator, or no inbound transaction ID, the handler runs
/// directly.  Otherwise: handler error triggers a rollback whose own
/// failure is logged but not re-raised; handler success triggers a commit
/// whose failure is propagated.
pub(crate) async fn with_transaction<T, F>(
    coordinator: Option<&Arc<dyn TransactionCoordinator>>,
    ctx: &RequestContext,
    handler: F,
) -> Result<T, AirportError>
where
    F: Future<Output = Result<T, AirportError>>,
{
    let (coordinator, transaction_id) = match (coordinator, ctx.transaction_id.as_deref()) {
        (Some(c), Some(id)) => (c, id),
        _ => return handler.await,
    };

    match handler.await {
        Ok(value) => {
            coordinator.commit(ctx, transaction_id).await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = coordinator.rollback(ctx, transaction_id).await {
                crate::airport_warn!(
                    Transaction,
                    "rollback of '{transaction_id}' failed: {rollback_err}"
                );
            }
            Err(err)
        }
    }
}
