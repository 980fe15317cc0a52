use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use shared::ActivityType;
use sqlx::{migrate::MigrateDatabase, FromRow, Sqlite, SqlitePool};
use std::sync::Arc;

// Fallback database URL when FARM_TRACKER_DB is not set
const DATABASE_URL: &str = "sqlite:farm_tracker.db";

/// A farm row. Listings are ordered newest first.
#[derive(Debug, Clone, FromRow)]
pub struct Farm {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A tree row joined with the name of its owning farm.
#[derive(Debug, Clone, FromRow)]
pub struct Tree {
    pub id: i64,
    pub farm_id: i64,
    pub tree_code: String,
    pub farm_name: String,
}

/// An activity row joined with its tree code and farm name, in the shape
/// the listing queries produce.
#[derive(Debug, Clone, FromRow)]
pub struct ActivityRow {
    pub id: i64,
    pub tree_code: String,
    pub farm_name: String,
    pub activity_type: String,
    pub custom_type: String,
    pub date: NaiveDate,
    pub quantity: String,
    pub notes: String,
    pub recorded_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// DbConnection manages database operations
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection
    pub async fn new(url: &str) -> Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?
        }

        // Connect to the database. Foreign keys are enforced on every
        // connection (sqlx's sqlite default), which the cascade and
        // SET NULL behavior below relies on.
        let pool = SqlitePool::connect(url).await?;

        // Setup database schema
        Self::setup_schema(&pool).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Initialize the standard database, honoring FARM_TRACKER_DB
    pub async fn init() -> Result<Self> {
        let url = std::env::var("FARM_TRACKER_DB").unwrap_or_else(|_| DATABASE_URL.to_string());
        Self::new(&url).await
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        // Generate a unique database name for tests
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::new(&db_url).await
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS farms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trees (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                farm_id INTEGER NOT NULL REFERENCES farms(id) ON DELETE CASCADE,
                tree_code TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tree_id INTEGER NOT NULL REFERENCES trees(id) ON DELETE CASCADE,
                activity_type TEXT NOT NULL,
                date TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                quantity TEXT NOT NULL DEFAULT '',
                custom_type TEXT NOT NULL DEFAULT '',
                recorded_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Get the underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a user account, returning its id
    pub async fn insert_user(&self, username: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO users (username) VALUES (?)")
            .bind(username)
            .execute(&*self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Delete a user. Farms and activities that reference the user keep
    /// their rows with the reference set to NULL.
    pub async fn delete_user(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Create a farm, returning its id
    pub async fn insert_farm(
        &self,
        name: &str,
        location: &str,
        created_by: Option<i64>,
    ) -> Result<i64> {
        let result =
            sqlx::query("INSERT INTO farms (name, location, created_by, created_at) VALUES (?, ?, ?, ?)")
                .bind(name)
                .bind(location)
                .bind(created_by)
                .bind(Utc::now())
                .execute(&*self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }

    /// Look up a farm by id
    pub async fn find_farm(&self, id: i64) -> Result<Option<Farm>> {
        let farm = sqlx::query_as::<_, Farm>(
            "SELECT id, name, location, created_by, created_at FROM farms WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(farm)
    }

    /// List all farms, newest first
    pub async fn list_farms(&self) -> Result<Vec<Farm>> {
        let farms = sqlx::query_as::<_, Farm>(
            "SELECT id, name, location, created_by, created_at FROM farms ORDER BY created_at DESC",
        )
        .fetch_all(&*self.pool)
        .await?;
        Ok(farms)
    }

    /// Delete a farm. Its trees, and their activities, go with it.
    pub async fn delete_farm(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM farms WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Create a tree, returning its id. Fails with a constraint violation
    /// if the code is already taken.
    pub async fn insert_tree(&self, farm_id: i64, tree_code: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO trees (farm_id, tree_code, created_at) VALUES (?, ?, ?)")
            .bind(farm_id)
            .bind(tree_code)
            .bind(Utc::now())
            .execute(&*self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Look up a tree by its external (QR) code, joined with its farm
    pub async fn find_tree_by_code(&self, tree_code: &str) -> Result<Option<Tree>> {
        let tree = sqlx::query_as::<_, Tree>(
            r#"
            SELECT t.id, t.farm_id, t.tree_code, f.name AS farm_name
            FROM trees t
            JOIN farms f ON f.id = t.farm_id
            WHERE t.tree_code = ?
            "#,
        )
        .bind(tree_code)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(tree)
    }

    /// List every tree with its farm, ordered by tree code
    pub async fn list_trees(&self) -> Result<Vec<Tree>> {
        let trees = sqlx::query_as::<_, Tree>(
            r#"
            SELECT t.id, t.farm_id, t.tree_code, f.name AS farm_name
            FROM trees t
            JOIN farms f ON f.id = t.farm_id
            ORDER BY t.tree_code ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;
        Ok(trees)
    }

    /// Delete a tree and, through the cascade, its activities
    pub async fn delete_tree(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM trees WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record an activity against a tree, returning the new row's id
    pub async fn insert_activity(
        &self,
        tree_id: i64,
        activity_type: ActivityType,
        date: NaiveDate,
        notes: &str,
        quantity: &str,
        custom_type: &str,
        recorded_by: Option<i64>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO activities
                (tree_id, activity_type, date, notes, quantity, custom_type, recorded_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tree_id)
        .bind(activity_type.as_str())
        .bind(date)
        .bind(notes)
        .bind(quantity)
        .bind(custom_type)
        .bind(recorded_by)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// List the most recent activities joined with tree and farm, ordered
    /// by activity date descending, then creation time descending.
    pub async fn recent_activities(&self, limit: i64) -> Result<Vec<ActivityRow>> {
        let activities = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT a.id, t.tree_code, f.name AS farm_name, a.activity_type,
                   a.custom_type, a.date, a.quantity, a.notes, a.recorded_by, a.created_at
            FROM activities a
            JOIN trees t ON t.id = a.tree_id
            JOIN farms f ON f.id = t.farm_id
            ORDER BY a.date DESC, a.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;
        Ok(activities)
    }

    /// Total number of stored activities
    pub async fn count_activities(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM activities")
            .fetch_one(&*self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Setup a new test database for each test
    async fn setup_test() -> DbConnection {
        DbConnection::init_test()
            .await
            .expect("Failed to create test database")
    }

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).expect("valid date")
    }

    #[tokio::test]
    async fn test_tree_code_is_unique() {
        let db = setup_test().await;

        let farm_id = db.insert_farm("North Grove", "", None).await.expect("insert farm");
        db.insert_tree(farm_id, "TREE-001").await.expect("insert tree");

        // Same code again must fail, even on another farm
        let other_farm = db.insert_farm("South Grove", "", None).await.expect("insert farm");
        let duplicate = db.insert_tree(other_farm, "TREE-001").await;
        assert!(duplicate.is_err(), "duplicate tree code should be rejected");

        // A different code is fine
        db.insert_tree(other_farm, "TREE-002").await.expect("insert tree");
    }

    #[tokio::test]
    async fn test_deleting_farm_cascades_to_trees_and_activities() {
        let db = setup_test().await;

        let farm_id = db.insert_farm("North Grove", "Valley road", None).await.unwrap();
        let tree_id = db.insert_tree(farm_id, "TREE-001").await.unwrap();
        db.insert_activity(tree_id, ActivityType::Pruning, june(1), "", "", "", None)
            .await
            .unwrap();
        db.insert_activity(tree_id, ActivityType::Harvesting, june(2), "", "10 bags", "", None)
            .await
            .unwrap();

        assert_eq!(db.count_activities().await.unwrap(), 2);

        let deleted = db.delete_farm(farm_id).await.unwrap();
        assert!(deleted);

        assert!(db.find_tree_by_code("TREE-001").await.unwrap().is_none());
        assert_eq!(db.count_activities().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deleting_tree_cascades_to_activities() {
        let db = setup_test().await;

        let farm_id = db.insert_farm("North Grove", "", None).await.unwrap();
        let tree_id = db.insert_tree(farm_id, "TREE-001").await.unwrap();
        db.insert_activity(tree_id, ActivityType::Fertilizer, june(1), "", "5kg", "", None)
            .await
            .unwrap();

        db.delete_tree(tree_id).await.unwrap();

        assert_eq!(db.count_activities().await.unwrap(), 0);
        // The farm itself is untouched
        assert!(db.find_farm(farm_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deleting_user_nulls_references_without_deleting_rows() {
        let db = setup_test().await;

        let user_id = db.insert_user("kerry").await.unwrap();
        let farm_id = db.insert_farm("North Grove", "", Some(user_id)).await.unwrap();
        let tree_id = db.insert_tree(farm_id, "TREE-001").await.unwrap();
        db.insert_activity(tree_id, ActivityType::Pruning, june(1), "", "", "", Some(user_id))
            .await
            .unwrap();

        db.delete_user(user_id).await.unwrap();

        let farm = db.find_farm(farm_id).await.unwrap().expect("farm still exists");
        assert_eq!(farm.created_by, None);

        let activities = db.recent_activities(10).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].recorded_by, None);
    }

    #[tokio::test]
    async fn test_recent_activities_ordering_and_join() {
        let db = setup_test().await;

        let farm_id = db.insert_farm("North Grove", "", None).await.unwrap();
        let tree_id = db.insert_tree(farm_id, "TREE-001").await.unwrap();

        // Inserted out of date order; two rows share a date so creation
        // time breaks the tie.
        db.insert_activity(tree_id, ActivityType::Pruning, june(2), "first of the 2nd", "", "", None)
            .await
            .unwrap();
        db.insert_activity(tree_id, ActivityType::Harvesting, june(5), "", "10 bags", "", None)
            .await
            .unwrap();
        db.insert_activity(tree_id, ActivityType::Fertilizer, june(2), "second of the 2nd", "5kg", "", None)
            .await
            .unwrap();

        let activities = db.recent_activities(10).await.unwrap();
        assert_eq!(activities.len(), 3);

        assert_eq!(activities[0].date, june(5));
        assert_eq!(activities[0].farm_name, "North Grove");
        assert_eq!(activities[0].tree_code, "TREE-001");

        // Same date: the later insert comes first
        assert_eq!(activities[1].date, june(2));
        assert_eq!(activities[1].notes, "second of the 2nd");
        assert_eq!(activities[2].notes, "first of the 2nd");
    }

    #[tokio::test]
    async fn test_recent_activities_respects_limit() {
        let db = setup_test().await;

        let farm_id = db.insert_farm("North Grove", "", None).await.unwrap();
        let tree_id = db.insert_tree(farm_id, "TREE-001").await.unwrap();
        for _ in 0..7 {
            db.insert_activity(tree_id, ActivityType::Pruning, june(1), "", "", "", None)
                .await
                .unwrap();
        }

        let activities = db.recent_activities(5).await.unwrap();
        assert_eq!(activities.len(), 5);
    }

    #[tokio::test]
    async fn test_list_farms_newest_first() {
        let db = setup_test().await;

        db.insert_farm("First", "", None).await.unwrap();
        db.insert_farm("Second", "", None).await.unwrap();
        db.insert_farm("Third", "", None).await.unwrap();

        let farms = db.list_farms().await.unwrap();
        let names: Vec<&str> = farms.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Third", "Second", "First"]);
    }

    #[tokio::test]
    async fn test_list_trees_ordered_by_code() {
        let db = setup_test().await;

        let farm_a = db.insert_farm("North Grove", "", None).await.unwrap();
        let farm_b = db.insert_farm("South Grove", "", None).await.unwrap();
        db.insert_tree(farm_b, "TREE-003").await.unwrap();
        db.insert_tree(farm_a, "TREE-001").await.unwrap();
        db.insert_tree(farm_a, "TREE-002").await.unwrap();

        let trees = db.list_trees().await.unwrap();
        let codes: Vec<&str> = trees.iter().map(|t| t.tree_code.as_str()).collect();
        assert_eq!(codes, vec!["TREE-001", "TREE-002", "TREE-003"]);
        assert_eq!(trees[2].farm_name, "South Grove");
    }

    #[tokio::test]
    async fn test_find_tree_by_code() {
        let db = setup_test().await;

        let farm_id = db.insert_farm("North Grove", "", None).await.unwrap();
        db.insert_tree(farm_id, "TREE-001").await.unwrap();

        let tree = db.find_tree_by_code("TREE-001").await.unwrap().expect("tree exists");
        assert_eq!(tree.farm_id, farm_id);
        assert_eq!(tree.farm_name, "North Grove");

        assert!(db.find_tree_by_code("TREE-999").await.unwrap().is_none());
    }
}
