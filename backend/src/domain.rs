use crate::db::DbConnection;
use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;
use shared::{ActivityRecord, PendingActivity, SyncResponse, TreeInfo};
use thiserror::Error;
use tracing::{info, warn};

/// Cap applied to every activity listing (dashboard and API alike).
pub const RECENT_ACTIVITY_LIMIT: i64 = 100;

/// Failure of one submitted activity. These are collected into the sync
/// response's `errors` list; they never abort the rest of the batch.
#[derive(Debug, Error)]
pub enum SyncItemError {
    #[error("tree {0} not found")]
    UnknownTree(String),
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Accepts batches of offline-captured activities and writes them into
/// the store, one row per successfully processed item.
#[derive(Clone)]
pub struct SyncService {
    db: DbConnection,
}

impl SyncService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Process a batch of pending activities in submission order.
    ///
    /// Each item commits on its own: a failed item is reported in the
    /// returned `errors` and leaves earlier successes in place. There is
    /// no de-duplication key, so resubmitting a batch inserts duplicate
    /// rows; callers are expected to clear their pending queue on success.
    pub async fn sync_activities(&self, items: &[Value]) -> Result<SyncResponse> {
        info!("Syncing batch of {} pending activities", items.len());

        let mut synced_count = 0u32;
        let mut errors = Vec::new();

        for item in items {
            // The code is pulled out up front so even an undecodable item
            // produces an error message naming the tree it was meant for.
            let tree_code = item
                .get("tree_id")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();

            match self.sync_one(item).await {
                Ok(()) => synced_count += 1,
                Err(err) => {
                    warn!("Failed to sync activity for {}: {}", tree_code, err);
                    errors.push(format!("Error syncing activity for {}: {}", tree_code, err));
                }
            }
        }

        info!(
            "Synced {} activities, {} failed",
            synced_count,
            errors.len()
        );
        Ok(SyncResponse {
            success: true,
            synced_count,
            errors,
        })
    }

    async fn sync_one(&self, item: &Value) -> Result<(), SyncItemError> {
        let pending: PendingActivity = serde_json::from_value(item.clone())?;

        let tree = self
            .db
            .find_tree_by_code(&pending.tree_id)
            .await?
            .ok_or_else(|| SyncItemError::UnknownTree(pending.tree_id.clone()))?;

        let date = NaiveDate::parse_from_str(&pending.date, "%Y-%m-%d")
            .map_err(|_| SyncItemError::InvalidDate(pending.date.clone()))?;

        // The sync path is unauthenticated, so no recorder is attached.
        self.db
            .insert_activity(
                tree.id,
                pending.activity_type,
                date,
                pending.notes.as_deref().unwrap_or(""),
                pending.quantity.as_deref().unwrap_or(""),
                pending.custom_type.as_deref().unwrap_or(""),
                None,
            )
            .await?;

        Ok(())
    }
}

/// Read-only queries backing the lookup endpoints and the rendered pages.
#[derive(Clone)]
pub struct LookupService {
    db: DbConnection,
}

impl LookupService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Resolve a tree's external code to its farm association.
    pub async fn tree_info(&self, tree_code: &str) -> Result<Option<TreeInfo>> {
        let tree = self.db.find_tree_by_code(tree_code).await?;
        Ok(tree.map(|t| TreeInfo {
            tree_id: t.tree_code,
            farm_name: t.farm_name,
            farm_id: t.farm_id,
        }))
    }

    /// The most recent activities (capped), flattened with tree and farm.
    pub async fn synced_activities(&self) -> Result<Vec<ActivityRecord>> {
        let rows = self.db.recent_activities(RECENT_ACTIVITY_LIMIT).await?;
        rows.into_iter()
            .map(|row| {
                let activity_type = row
                    .activity_type
                    .parse()
                    .map_err(|e| anyhow::anyhow!("activity {}: {}", row.id, e))?;
                Ok(ActivityRecord {
                    id: row.id,
                    tree_id: row.tree_code,
                    farm_name: row.farm_name,
                    activity_type,
                    custom_type: row.custom_type,
                    date: row.date,
                    quantity: row.quantity,
                    notes: row.notes,
                    created_at: Some(row.created_at),
                })
            })
            .collect()
    }

    /// Every tree with its farm association, for offline caching.
    pub async fn all_trees(&self) -> Result<Vec<TreeInfo>> {
        let trees = self.db.list_trees().await?;
        Ok(trees
            .into_iter()
            .map(|t| TreeInfo {
                tree_id: t.tree_code,
                farm_name: t.farm_name,
                farm_id: t.farm_id,
            })
            .collect())
    }

    /// All farms, newest first, for the rendered pages.
    pub async fn farms(&self) -> Result<Vec<crate::db::Farm>> {
        self.db.list_farms().await
    }
}
