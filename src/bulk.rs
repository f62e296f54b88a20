use std::future::Future;

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::models::BatchOutcome;

/// Runs every request concurrently and tallies how each one settled. A
/// failure is logged and counted; it never cancels its siblings and nothing
/// is retried.
pub async fn settle_all<I, F, T>(operation: &str, requests: I) -> BatchOutcome
where
    I: IntoIterator<Item = (String, F)>,
    F: Future<Output = Result<T, ApiError>>,
{
    let (labels, pending): (Vec<String>, Vec<F>) = requests.into_iter().unzip();
    let results = join_all(pending).await;

    let mut outcome = BatchOutcome::default();
    for (label, result) in labels.iter().zip(results) {
        match result {
            Ok(_) => outcome.updated += 1,
            Err(err) => {
                warn!(operation = operation, item = %label, error = %err, "batch item failed");
                outcome.failed += 1;
            }
        }
    }

    info!(
        operation = operation,
        updated = outcome.updated,
        failed = outcome.failed,
        "batch settled"
    );
    outcome
}
