//! ✍️ The executor: hands a plan to the store and translates whatever comes back.
//!
//! No retries here. Retrying means re-planning against fresh persisted state, and only the
//! orchestrator knows how to do that. This layer just makes sure a failed apply comes back
//! as a [`TransactionError`] with a message a human can act on.

use tracing::{debug, error};

use crate::errors::TransactionError;
use crate::planner::UpsertPlan;
use crate::stores::{AppliedCounts, RecordStore};

/// ✍️ Apply `plan` in one transaction. A plan with nothing to write never reaches the store.
pub async fn execute<S>(store: &S, plan: &UpsertPlan) -> Result<AppliedCounts, TransactionError>
where
    S: RecordStore + ?Sized,
{
    if plan.write_count() == 0 {
        debug!(entity = %plan.entity, partition = %plan.partition, "😴 nothing to write");
        return Ok(AppliedCounts::default());
    }

    match store.apply(plan).await {
        Ok(counts) => {
            debug!(
                entity = %plan.entity,
                partition = %plan.partition,
                inserted = counts.inserted,
                updated = counts.updated,
                deleted = counts.deleted,
                "✅ transaction committed"
            );
            Ok(counts)
        }
        Err(err) => {
            error!(
                entity = %plan.entity,
                partition = %plan.partition,
                error = %format!("{err:#}"),
                "💀 transaction rolled back"
            );
            Err(TransactionError {
                entity: plan.entity,
                partition: plan.partition,
                message: format!("{err:#}"),
            })
        }
    }
}
