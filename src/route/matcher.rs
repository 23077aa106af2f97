use std::sync::Arc;

use crate::core::store::RouteStore;
use crate::error::{PipelineError, Result};
use crate::models::{ComparisonVerdict, RouteImage};
use crate::route::compare::RouteComparator;
use crate::worker::WorkerPool;

pub const NO_ROUTES_EXPLANATION: &str = "No existing routes to compare with.";
pub const NO_MATCH_EXPLANATION: &str = "No similar route found.";
pub const UNAVAILABLE_EXPLANATION: &str =
    "The route comparison service was unavailable; the route was treated as new.";

/// How a duplicate scan reduces individual comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    /// Stop scanning at the first match.
    pub short_circuit: bool,
    /// When every comparison fails, report "no match" instead of an error.
    pub fail_open: bool,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            short_circuit: true,
            fail_open: true,
        }
    }
}

/// Scans stored routes for one that the comparator judges identical.
pub struct DuplicateMatcher<C> {
    comparator: Arc<C>,
    pool: WorkerPool,
    pub policy: MatchPolicy,
}

impl<C: RouteComparator> DuplicateMatcher<C> {
    pub fn new(comparator: Arc<C>, pool: WorkerPool) -> Self {
        Self {
            comparator,
            pool,
            policy: MatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compare `query` against each of `stored`, in the given order.
    ///
    /// The first route reported as a match wins. A route that cannot be read
    /// or compared counts as "no match, no explanation" and the scan moves
    /// on; only a scan in which every comparison failed is treated as an
    /// outage, resolved according to `policy.fail_open`.
    pub async fn find_match<S: RouteStore>(
        &self,
        query: &[u8],
        stored: &[RouteImage],
        store: &S,
    ) -> Result<ComparisonVerdict> {
        if stored.is_empty() {
            return Ok(ComparisonVerdict::no_match(NO_ROUTES_EXPLANATION));
        }

        let mut comparisons = 0;
        let mut failures = 0;
        let mut last_explanation: Option<String> = None;
        let mut matched: Option<(RouteImage, Option<String>)> = None;
        let mut last_error: Option<PipelineError> = None;

        for route in stored {
            comparisons += 1;
            let reply = match store.read(&route.name).await {
                Ok(reference) => {
                    self.pool
                        .run("compare", self.comparator.compare(query, &reference))
                        .await
                        .and_then(|reply| reply)
                }
                Err(e) => Err(e),
            };

            match reply {
                Ok(reply) if reply.is_match => {
                    tracing::info!(route = %route, "comparator reported a match");
                    if matched.is_none() {
                        matched = Some((route.clone(), reply.explanation));
                    }
                    if self.policy.short_circuit {
                        break;
                    }
                }
                Ok(reply) => {
                    tracing::debug!(route = %route, "comparator reported no match");
                    if reply.explanation.is_some() {
                        last_explanation = reply.explanation;
                    }
                }
                Err(e) => {
                    tracing::warn!(route = %route, error = %e, "comparison failed, treating as no match");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if let Some((route, explanation)) = matched {
            return Ok(ComparisonVerdict {
                is_match: true,
                matched_route: Some(route),
                explanation: explanation.unwrap_or_else(|| "Matched an existing route.".to_string()),
                comparisons,
                failures,
            });
        }

        if failures == comparisons {
            if !self.policy.fail_open {
                let cause = last_error.map(|e| e.to_string()).unwrap_or_default();
                return Err(PipelineError::UpstreamComparison(format!(
                    "all {comparisons} comparisons failed: {cause}"
                )));
            }
            tracing::warn!(comparisons, "comparison service unavailable, treating route as new");
            return Ok(ComparisonVerdict {
                comparisons,
                failures,
                ..ComparisonVerdict::no_match(UNAVAILABLE_EXPLANATION)
            });
        }

        Ok(ComparisonVerdict {
            comparisons,
            failures,
            ..ComparisonVerdict::no_match(
                last_explanation.unwrap_or_else(|| NO_MATCH_EXPLANATION.to_string()),
            )
        })
    }
}
