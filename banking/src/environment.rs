//! Handler dependencies that tests replace.

use ledger_outbox_core::environment::{Clock, IdGenerator, RandomIds, SystemClock};
use std::sync::Arc;

/// Time and identity sources for the command handlers.
#[derive(Clone)]
pub struct BankEnvironment {
    /// Timestamps for aggregates, events and outbox rows.
    pub clock: Arc<dyn Clock>,
    /// Identities for aggregates, events and outbox rows.
    pub ids: Arc<dyn IdGenerator>,
}

impl BankEnvironment {
    /// Build from explicit sources.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { clock, ids }
    }
}

impl Default for BankEnvironment {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(RandomIds))
    }
}

impl std::fmt::Debug for BankEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankEnvironment").finish_non_exhaustive()
    }
}
