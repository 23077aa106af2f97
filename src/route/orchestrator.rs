use std::sync::Arc;

use tracing::Instrument;

use crate::core::store::RouteStore;
use crate::error::{PipelineError, Result};
use crate::models::{Rendering, RouteImage, SelectionRequest};
use crate::route::compare::RouteComparator;
use crate::route::matcher::DuplicateMatcher;
use crate::route::render::{RouteRenderer, RouteRenderings};
use crate::worker::WorkerPool;

/// Stages a submission moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Received,
    Rendered,
    Matching,
    Matched,
    Saved,
    Done,
    Failed,
}

/// What became of a submitted route.
#[derive(Debug, Clone)]
pub enum SelectionOutcome {
    /// An equivalent route is already stored; nothing new was written.
    Matched {
        route: RouteImage,
        explanation: String,
    },
    /// The route was new and has been stored.
    Saved {
        route: RouteImage,
        accepted: Rendering,
        comparison: Rendering,
        /// Name the comparison rendering had while it was staged.
        comparison_name: String,
        explanation: String,
    },
}

impl SelectionOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    pub fn route(&self) -> &RouteImage {
        match self {
            Self::Matched { route, .. } | Self::Saved { route, .. } => route,
        }
    }

    pub fn explanation(&self) -> &str {
        match self {
            Self::Matched { explanation, .. } | Self::Saved { explanation, .. } => explanation,
        }
    }
}

/// Drives one submission through render, duplicate scan and persistence.
pub struct SelectionOrchestrator<S, C> {
    renderer: Arc<RouteRenderer>,
    matcher: DuplicateMatcher<C>,
    store: Arc<S>,
    pool: WorkerPool,
}

impl<S: RouteStore, C: RouteComparator> SelectionOrchestrator<S, C> {
    pub fn new(
        renderer: RouteRenderer,
        matcher: DuplicateMatcher<C>,
        store: Arc<S>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            renderer: Arc::new(renderer),
            matcher,
            store,
            pool,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Process a route submission end to end.
    ///
    /// Stages run strictly in order and a failure in any of them aborts the
    /// submission; nothing is retried. The staged comparison rendering is
    /// removed on every exit path.
    pub async fn submit(&self, submission_id: &str, request: SelectionRequest) -> Result<SelectionOutcome> {
        let span = tracing::info_span!("selection", submission = %submission_id);
        let result = self.run(submission_id, request).instrument(span).await;
        if let Err(e) = &result {
            transition(submission_id, SelectionState::Failed);
            tracing::warn!(submission = %submission_id, kind = %e.kind(), error = %e, "selection failed");
        }
        result
    }

    async fn run(&self, submission_id: &str, request: SelectionRequest) -> Result<SelectionOutcome> {
        transition(submission_id, SelectionState::Received);
        request.validate()?;

        let renderer = self.renderer.clone();
        let SelectionRequest {
            selected_ids,
            all_detections,
            base_image,
        } = request;
        let renderings = self
            .pool
            .run_blocking("render", move || {
                renderer.render(&base_image, &all_detections, &selected_ids)
            })
            .await??;
        transition(submission_id, SelectionState::Rendered);

        let transient = self.store.stage(&renderings.comparison).await?;
        let comparison_name = transient.name().to_string();
        let outcome = self.decide(submission_id, renderings, comparison_name).await;
        self.store.discard(transient).await;

        if outcome.is_ok() {
            transition(submission_id, SelectionState::Done);
        }
        outcome
    }

    async fn decide(
        &self,
        submission_id: &str,
        renderings: RouteRenderings,
        comparison_name: String,
    ) -> Result<SelectionOutcome> {
        transition(submission_id, SelectionState::Matching);
        let stored = self.store.list().await?;
        let verdict = self
            .matcher
            .find_match(&renderings.comparison.jpeg, &stored, self.store.as_ref())
            .await?;
        tracing::info!(
            submission = %submission_id,
            stored = stored.len(),
            comparisons = verdict.comparisons,
            failures = verdict.failures,
            is_match = verdict.is_match,
            "duplicate scan finished"
        );

        if verdict.is_match {
            let route = verdict.matched_route.ok_or_else(|| {
                PipelineError::UpstreamComparison("match reported without a route".to_string())
            })?;
            transition(submission_id, SelectionState::Matched);
            return Ok(SelectionOutcome::Matched {
                route,
                explanation: verdict.explanation,
            });
        }

        let route = self.store.save(&renderings.accepted).await?;
        transition(submission_id, SelectionState::Saved);
        Ok(SelectionOutcome::Saved {
            route,
            accepted: renderings.accepted,
            comparison: renderings.comparison,
            comparison_name,
            explanation: verdict.explanation,
        })
    }
}

fn transition(submission_id: &str, state: SelectionState) {
    tracing::debug!(submission = %submission_id, ?state, "selection state");
}
