//! Append-only metric samples, distinct from the Prometheus gauges exposed
//! over `/metrics`: these are point-in-time business samples (e.g. catalog
//! size, tests performed) retained for historical reporting.

use dtm_core::Metric;

use crate::{Store, StoreError, StoreResult};

impl Store {
    /// Append a metric sample.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn record_metric(&self, metric: &Metric) -> StoreResult<()> {
        sqlx::query("INSERT INTO metrics (recorded_at, name, value, tags) VALUES (?, ?, ?, ?)")
            .bind(metric.recorded_at)
            .bind(&metric.name)
            .bind(metric.value)
            .bind(&metric.tags)
            .execute(self.pool())
            .await
            .map_err(|source| StoreError::query("record_metric", source))?;
        Ok(())
    }

    /// Fetch the most recent samples for `name`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the statement fails.
    pub async fn get_recent_metrics(&self, name: &str, limit: u32) -> StoreResult<Vec<Metric>> {
        use sqlx::Row;

        let rows = sqlx::query("SELECT * FROM metrics WHERE name = ? ORDER BY recorded_at DESC LIMIT ?")
            .bind(name)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(|source| StoreError::query("get_recent_metrics", source))?;

        rows.iter()
            .map(|row| {
                Ok(Metric {
                    id: row.try_get("id").map_err(|source| StoreError::query("decode metric", source))?,
                    recorded_at: row
                        .try_get("recorded_at")
                        .map_err(|source| StoreError::query("decode metric", source))?,
                    name: row.try_get("name").map_err(|source| StoreError::query("decode metric", source))?,
                    value: row.try_get("value").map_err(|source| StoreError::query("decode metric", source))?,
                    tags: row.try_get("tags").map_err(|source| StoreError::query("decode metric", source))?,
                })
            })
            .collect()
    }
}
