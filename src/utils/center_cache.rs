use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use moka::future::Cache;
use sqlx::MySqlPool;

use crate::{
    model::tutor::Center,
    store::{CenterDirectory, StoreError, mysql::CenterRow},
};

/// Read-through cache in front of the center directory. Center coordinates
/// change rarely and are read on every self check-in.
pub struct CachedCenters {
    inner: Arc<dyn CenterDirectory>,
    cache: Cache<u64, Center>,
}

impl CachedCenters {
    pub fn new(inner: Arc<dyn CenterDirectory>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Batch insert centers into the cache
    async fn batch_insert(&self, centers: Vec<Center>) {
        let futures: Vec<_> = centers
            .into_iter()
            .map(|c| self.cache.insert(c.id, c))
            .collect();

        futures::future::join_all(futures).await;
    }

    /// Load every center into the cache, streamed in batches
    pub async fn warmup(&self, pool: &MySqlPool, batch_size: usize) -> Result<()> {
        let mut stream = sqlx::query_as::<_, CenterRow>(
            "SELECT id, name, latitude, longitude FROM centers",
        )
        .fetch(pool);

        let mut batch = Vec::with_capacity(batch_size);
        let mut total_count = 0usize;

        while let Some(row) = stream.next().await {
            batch.push(Center::from(row?));
            total_count += 1;

            if batch.len() >= batch_size {
                self.batch_insert(std::mem::take(&mut batch)).await;
            }
        }

        if !batch.is_empty() {
            self.batch_insert(batch).await;
        }

        tracing::info!(total_count, "Center cache warmup complete");

        Ok(())
    }

    #[cfg(test)]
    pub async fn invalidate(&self, id: u64) {
        self.cache.invalidate(&id).await;
    }
}

#[async_trait]
impl CenterDirectory for CachedCenters {
    async fn center(&self, id: u64) -> Result<Option<Center>, StoreError> {
        if let Some(center) = self.cache.get(&id).await {
            return Ok(Some(center));
        }

        let center = self.inner.center(id).await?;
        if let Some(c) = &center {
            self.cache.insert(id, c.clone()).await;
        }
        Ok(center)
    }
}
