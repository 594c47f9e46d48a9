//! Cart statistics over a rolling window.

use chrono::{DateTime, Utc};
use tracing::debug;

use comptoir_core::stats::aggregate;
use comptoir_core::{StatsPeriod, StatsReport, StatusFilter};

use crate::engine::CartEngine;
use crate::error::EngineResult;

impl CartEngine {
    /// Counts, amounts, per-bucket series and top companies/clients for the
    /// carts created in `period`. Buckets are aligned on UTC hours or days.
    pub async fn get_stats(
        &self,
        period: StatsPeriod,
        filter: StatusFilter,
    ) -> EngineResult<StatsReport> {
        self.stats_at(period, filter, Utc::now()).await
    }

    /// [`get_stats`](Self::get_stats) with an explicit "now".
    pub async fn stats_at(
        &self,
        period: StatsPeriod,
        filter: StatusFilter,
        now: DateTime<Utc>,
    ) -> EngineResult<StatsReport> {
        let window_start = period.window_start(now);
        let rows = self
            .read("stats rows", || self.stats.rows_since(window_start, filter.status()))
            .await?;

        debug!(%period, %filter, rows = rows.len(), "Aggregating stats");
        Ok(aggregate(period, filter, &rows, now, self.config.top_n))
    }
}
