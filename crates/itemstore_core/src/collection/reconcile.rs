//! Reconciliation against the external authority.

use super::ItemCollection;
use crate::authority::ExternalAuthority;
use crate::error::{CoreError, CoreResult};
use crate::item::{ItemId, TrackedItem};
use tracing::{debug, info, warn};

/// What reconciling one item did to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The authority knows the record; attributes were copied and the item
    /// marked saved.
    Saved,
    /// The authority does not know the record; the item was marked deleted.
    Deleted,
}

/// Outcome of [`ItemCollection::set_all_game_info`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Items confirmed by the authority.
    pub saved: usize,
    /// Items the authority no longer knows.
    pub deleted: usize,
    /// Items that could not be reconciled.
    pub failed: usize,
}

impl<T: TrackedItem> ItemCollection<T> {
    /// Reconciles one item with the authority and persists the result.
    ///
    /// Returns `None` if the item is not stored.
    pub fn set_game_info<A>(&self, id: ItemId, authority: &A) -> CoreResult<Option<Reconciled>>
    where
        A: ExternalAuthority + ?Sized,
    {
        let Some(mut item) = self.get(id)? else {
            return Ok(None);
        };

        let outcome = match authority.lookup(id) {
            Some(record) => {
                item.apply_external(&record);
                Reconciled::Saved
            }
            None => {
                item.mark_deleted();
                Reconciled::Deleted
            }
        };
        self.upsert(item)?;
        debug!(id = %id, ?outcome, "item reconciled");
        Ok(Some(outcome))
    }

    /// Reconciles every stored item.
    ///
    /// First waits for the authority to become ready. If it does not within
    /// the configured timeout, nothing is written and
    /// [`CoreError::Timeout`] is returned. A failure on one item is logged
    /// and counted; the remaining items are still reconciled.
    pub fn set_all_game_info<A>(&self, authority: &A) -> CoreResult<ReconcileReport>
    where
        A: ExternalAuthority + ?Sized,
    {
        let timeout = self.config.ready_timeout;
        if !authority.wait_ready(timeout, self.config.ready_poll_interval) {
            warn!(?timeout, "external authority not ready, reconciliation aborted");
            return Err(CoreError::Timeout { waited: timeout });
        }

        let ids = self.handle()?.ids();
        let mut report = ReconcileReport::default();
        for id in ids {
            match self.set_game_info(id, authority) {
                Ok(Some(Reconciled::Saved)) => report.saved += 1,
                Ok(Some(Reconciled::Deleted)) => report.deleted += 1,
                Ok(None) => {}
                Err(CoreError::Disposed) => return Err(CoreError::Disposed),
                Err(err) => {
                    warn!(id = %id, error = %err, "failed to reconcile item");
                    report.failed += 1;
                }
            }
        }

        info!(
            saved = report.saved,
            deleted = report.deleted,
            failed = report.failed,
            "reconciliation finished"
        );
        Ok(report)
    }
}
