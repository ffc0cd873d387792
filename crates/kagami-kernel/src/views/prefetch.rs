//! Bounded-concurrency batch generation.
//!
//! Prefetch walks a batch of (target, view) pairs and brings each artifact
//! current, at most `concurrency` generations in flight at once. Fresh
//! targets are skipped. Failures never abort the batch; they come back in
//! the report.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kagami_types::{CallContext, View};

use crate::error::AfsResult;
use crate::views::{ViewProcessor, ViewTarget};

/// Options for a prefetch batch.
#[derive(Clone, Debug, Default)]
pub struct PrefetchOptions {
    /// Concurrent generations. Engine default when absent, floored at 1.
    pub concurrency: Option<usize>,
    /// Caller attribution, forwarded to drivers.
    pub ctx: CallContext,
}

impl PrefetchOptions {
    /// Set the concurrency bound.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }

    /// Set the call context.
    pub fn with_ctx(mut self, ctx: CallContext) -> Self {
        self.ctx = ctx;
        self
    }
}

/// Outcome of a prefetch batch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PrefetchReport {
    /// Artifacts generated by this batch.
    pub generated: usize,
    /// Targets that were already current or had generation in flight.
    pub skipped: usize,
    /// Failed targets: (`path [view]`, error message).
    pub failed: Vec<(String, String)>,
}

impl PrefetchReport {
    /// Whether every target ended up current.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Outcome {
    Generated,
    Skipped,
    Failed(String),
}

impl ViewProcessor {
    /// Bring a batch of (target, view) artifacts current.
    #[tracing::instrument(skip_all, fields(targets = items.len()), name = "views.prefetch")]
    pub async fn prefetch(
        &self,
        items: Vec<(ViewTarget, View)>,
        opts: &PrefetchOptions,
    ) -> PrefetchReport {
        let concurrency = opts
            .concurrency
            .unwrap_or(self.config.prefetch_concurrency)
            .max(1);

        let results: Vec<(String, Outcome)> =
            futures::stream::iter(items.into_iter().map(|(target, view)| {
                let ctx = opts.ctx.clone();
                async move {
                    let label = format!("{} [{}]", target.path, view.key());
                    let outcome = match self.prefetch_one(&target, &view, ctx).await {
                        Ok(true) => Outcome::Generated,
                        Ok(false) => Outcome::Skipped,
                        Err(err) => Outcome::Failed(err.to_string()),
                    };
                    (label, outcome)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = PrefetchReport::default();
        for (label, outcome) in results {
            match outcome {
                Outcome::Generated => report.generated += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed(err) => report.failed.push((label, err)),
            }
        }
        debug!(
            "Prefetch batch done: {} generated, {} skipped, {} failed",
            report.generated,
            report.skipped,
            report.failed.len()
        );
        report
    }

    /// Generate one artifact if it is stale. `Ok(true)` means a generation
    /// ran, `Ok(false)` means the target was already current.
    async fn prefetch_one(
        &self,
        target: &ViewTarget,
        view: &View,
        ctx: CallContext,
    ) -> AfsResult<bool> {
        let key = view.key();
        let (revision, _source) = self.current_revision(target).await?;
        let meta = self
            .store
            .get_view(&target.mount, &target.subpath, key.as_str())
            .await?
            .unwrap_or_default();
        if !meta.stale_against(&revision) {
            return Ok(false);
        }
        self.process_view(target, view, ctx).await?;
        Ok(true)
    }
}
