//! Per-flow connection and transaction state.
//!
//! A [`FlowContext`] owns at most one [`ConnectionContext`] per logical
//! connection name. Contexts are opened on first use and finalized exactly
//! once when the flow ends: rolled back if anything failed, committed if
//! anything was written, then closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use oxide_dal::{Connection, Connector, Provider};

use crate::config::Services;
use crate::error::{FlowError, Result};

/// Cooperative cancellation flag, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An open connection plus its transaction bookkeeping.
pub struct ConnectionContext {
    name: String,
    provider: Arc<dyn Provider>,
    connection: Option<Box<dyn Connection>>,
    in_transaction: bool,
    executed: usize,
    pending: usize,
    errored: bool,
    closed: bool,
}

impl ConnectionContext {
    /// Wraps a freshly opened connection.
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        connection: Box<dyn Connection>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            connection: Some(connection),
            in_transaction: false,
            executed: 0,
            pending: 0,
            errored: false,
            closed: false,
        }
    }

    /// Logical connection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider for the connection's dialect.
    #[must_use]
    pub fn provider(&self) -> Arc<dyn Provider> {
        Arc::clone(&self.provider)
    }

    /// The open connection.
    pub fn connection(&mut self) -> Result<&mut dyn Connection> {
        match self.connection.as_deref_mut() {
            Some(conn) => Ok(conn),
            None => Err(FlowError::UnknownConnection(format!(
                "{} (already closed)",
                self.name
            ))),
        }
    }

    /// Opens the transaction unless one is already open.
    pub async fn ensure_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Ok(());
        }
        self.connection()?.begin().await?;
        self.in_transaction = true;
        Ok(())
    }

    /// Counts one executed statement; writes also count as pending.
    pub fn record_execution(&mut self, read_only: bool) {
        self.executed += 1;
        if !read_only {
            self.pending += 1;
        }
    }

    /// Flags the context so finalization rolls back.
    pub fn mark_errored(&mut self) {
        self.errored = true;
    }

    /// Whether a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Statements executed so far.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Writes awaiting commit.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Whether a step failed.
    #[must_use]
    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Whether the context has been finalized.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Resolves the transaction and closes the connection. Runs once; later
    /// calls do nothing. Failures are logged, never returned.
    pub async fn finalize(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let Some(mut conn) = self.connection.take() else {
            return;
        };

        if self.in_transaction {
            let (action, outcome) = if self.errored || self.pending == 0 {
                ("rollback", conn.rollback().await)
            } else {
                ("commit", conn.commit().await)
            };
            self.in_transaction = false;
            match outcome {
                Ok(()) => info!(connection = %self.name, action, pending = self.pending, "Transaction finished"),
                Err(e) => warn!(connection = %self.name, action, error = %e, "Failed to finish transaction"),
            }
        }

        if let Err(e) = conn.close().await {
            warn!(connection = %self.name, error = %e, "Failed to close connection");
        }
        info!(
            connection = %self.name,
            executed = self.executed,
            errored = self.errored,
            "Connection context closed"
        );
    }
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .field("in_transaction", &self.in_transaction)
            .field("executed", &self.executed)
            .field("pending", &self.pending)
            .field("errored", &self.errored)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Connection contexts of one flow run, nested flows included.
#[derive(Debug, Default)]
pub struct FlowContext {
    contexts: Vec<ConnectionContext>,
}

impl FlowContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The context for `name`, opening the connection on first use.
    pub async fn open(
        &mut self,
        name: &str,
        services: &Services,
        connector: &dyn Connector,
    ) -> Result<&mut ConnectionContext> {
        let existing = self.contexts.iter().position(|c| c.name == name);
        let index = if let Some(index) = existing {
            index
        } else {
            let settings = services.connections.get(name)?;
            let provider = services.providers.get(&settings.dialect)?;
            let connection = connector.connect(settings).await?;
            info!(connection = %name, dialect = %provider.name(), "Connection context opened");
            self.contexts
                .push(ConnectionContext::new(name, provider, connection));
            self.contexts.len() - 1
        };
        Ok(&mut self.contexts[index])
    }

    /// Looks up an already opened context.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ConnectionContext> {
        self.contexts.iter().find(|c| c.name == name)
    }

    /// Every context opened so far.
    pub fn contexts(&self) -> impl Iterator<Item = &ConnectionContext> {
        self.contexts.iter()
    }

    /// Flags every context for rollback.
    pub fn mark_errored(&mut self) {
        for context in &mut self.contexts {
            context.mark_errored();
        }
    }

    /// Finalizes every context in opening order.
    pub async fn finalize(&mut self) {
        for context in &mut self.contexts {
            context.finalize().await;
        }
    }
}
