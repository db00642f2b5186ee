//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the
//! `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Atomicity
//!
//! The multi-row mutations (plugin + realm insert, replace-all-children,
//! cascade delete) each run inside one explicit transaction, so readers
//! only ever observe the tree before or after a publish, never mid-way.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{NodeRow, PluginRow, TargetRow, build_tree};
use crate::discovery::{DiscoveryNode, DiscoveryPlugin, UNIVERSE_NAME};
use crate::targets::TargetRecord;

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for optimal performance (WAL mode, etc.)
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    async fn universe_id<'e, E>(executor: E) -> StorageResult<i64>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query("SELECT id FROM nodes WHERE kind = 'universe'")
            .fetch_optional(executor)
            .await?;
        row.map(|r| r.get("id"))
            .ok_or_else(|| StorageError::QueryFailed("universe row missing".to_string()))
    }

    /// Insert a subtree under `parent_id`, walking with an explicit stack
    /// so target payloads land next to their structural rows in the same
    /// transaction.
    async fn insert_subtree(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        realm: &str,
        parent_id: i64,
        children: &[DiscoveryNode],
    ) -> StorageResult<()> {
        let mut stack: Vec<(i64, DiscoveryNode)> = children
            .iter()
            .rev()
            .map(|c| (parent_id, c.clone()))
            .collect();

        while let Some((parent, node)) = stack.pop() {
            let (kind, payload) = match &node {
                DiscoveryNode::Universe { .. } => {
                    return Err(StorageError::QueryFailed(
                        "universe node inside a realm subtree".to_string(),
                    ));
                }
                DiscoveryNode::Realm { .. } => ("realm", None),
                DiscoveryNode::Target { target, .. } => {
                    ("target", Some(serde_json::to_string(target)?))
                }
            };

            let result = sqlx::query(
                "INSERT INTO nodes (parent_id, realm, kind, name, payload) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(parent)
            .bind(realm)
            .bind(kind)
            .bind(node.name())
            .bind(payload)
            .execute(&mut **tx)
            .await?;

            let id = result.last_insert_rowid();
            for child in node.children().iter().rev() {
                stack.push((id, child.clone()));
            }
        }

        Ok(())
    }

    fn plugin_from_row(row: &sqlx::sqlite::SqliteRow) -> StorageResult<DiscoveryPlugin> {
        PluginRow {
            id: row.get("id"),
            realm: row.get("realm"),
            callback: row.get("callback"),
            credential: row.get("credential"),
            builtin: row.get::<i64, _>("builtin") != 0,
            registered_at: row.get("registered_at"),
        }
        .into_plugin()
    }

    fn target_from_row(row: &sqlx::sqlite::SqliteRow) -> StorageResult<TargetRecord> {
        TargetRow {
            connect_url: row.get("connect_url"),
            alias: row.get("alias"),
            jvm_id: row.get("jvm_id"),
            recordings: row.get("recordings"),
            last_reconciled: row.get("last_reconciled"),
        }
        .into_record()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn ensure_universe(&self) -> StorageResult<()> {
        // Conditional insert keeps repeated bootstraps a no-op
        sqlx::query(
            r#"
            INSERT INTO nodes (parent_id, realm, kind, name, payload)
            SELECT NULL, NULL, 'universe', ?, NULL
            WHERE NOT EXISTS (SELECT 1 FROM nodes WHERE kind = 'universe')
            "#,
        )
        .bind(UNIVERSE_NAME)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_universe(&self) -> StorageResult<DiscoveryNode> {
        let rows =
            sqlx::query("SELECT id, parent_id, realm, kind, name, payload FROM nodes ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        let node_rows = rows
            .into_iter()
            .map(|row| NodeRow {
                id: row.get("id"),
                parent_id: row.get("parent_id"),
                realm: row.get("realm"),
                kind: row.get("kind"),
                name: row.get("name"),
                payload: row.get("payload"),
            })
            .collect();

        build_tree(node_rows)
    }

    #[instrument(skip(self, plugin), fields(realm = %plugin.realm))]
    async fn insert_plugin(&self, plugin: &DiscoveryPlugin) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let universe = Self::universe_id(&mut *tx).await?;
        sqlx::query("INSERT INTO nodes (parent_id, realm, kind, name, payload) VALUES (?, ?, 'realm', ?, NULL)")
            .bind(universe)
            .bind(&plugin.realm)
            .bind(&plugin.realm)
            .execute(&mut *tx)
            .await?;

        let row = PluginRow::from_plugin(plugin);
        sqlx::query(
            r#"
            INSERT INTO plugins (id, realm, callback, credential, builtin, registered_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.realm)
        .bind(&row.callback)
        .bind(&row.credential)
        .bind(row.builtin as i64)
        .bind(row.registered_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, children), fields(realm = %realm, count = children.len()))]
    async fn replace_realm_children(
        &self,
        realm: &str,
        children: &[DiscoveryNode],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let root: Option<i64> =
            sqlx::query("SELECT id FROM nodes WHERE kind = 'realm' AND realm = ? AND name = ?")
                .bind(realm)
                .bind(realm)
                .fetch_optional(&mut *tx)
                .await?
                .map(|r| r.get("id"));
        let root =
            root.ok_or_else(|| StorageError::QueryFailed(format!("realm not found: {realm}")))?;

        // Drop everything under the realm root, keep the root itself
        sqlx::query("DELETE FROM nodes WHERE realm = ? AND id != ?")
            .bind(realm)
            .bind(root)
            .execute(&mut *tx)
            .await?;

        Self::insert_subtree(&mut tx, realm, root, children).await?;

        tx.commit().await?;
        debug!("realm children replaced");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_plugin(&self, id: Uuid) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let realm: Option<String> = sqlx::query("SELECT realm FROM plugins WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.get("realm"));
        let realm =
            realm.ok_or_else(|| StorageError::QueryFailed(format!("plugin not found: {id}")))?;

        sqlx::query("DELETE FROM nodes WHERE realm = ?")
            .bind(&realm)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM plugins WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_plugins(&self) -> StorageResult<Vec<DiscoveryPlugin>> {
        let rows = sqlx::query(
            "SELECT id, realm, callback, credential, builtin, registered_at FROM plugins",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::plugin_from_row).collect()
    }

    async fn get_plugin(&self, id: Uuid) -> StorageResult<Option<DiscoveryPlugin>> {
        let row = sqlx::query(
            "SELECT id, realm, callback, credential, builtin, registered_at FROM plugins WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::plugin_from_row).transpose()
    }

    async fn get_target(&self, connect_url: &str) -> StorageResult<Option<TargetRecord>> {
        let row = sqlx::query(
            "SELECT connect_url, alias, jvm_id, recordings, last_reconciled FROM targets WHERE connect_url = ?",
        )
        .bind(connect_url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::target_from_row).transpose()
    }

    async fn upsert_target(&self, record: &TargetRecord) -> StorageResult<()> {
        let row = TargetRow::from_record(record)?;
        sqlx::query(
            r#"
            INSERT INTO targets (connect_url, alias, jvm_id, recordings, last_reconciled)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (connect_url) DO UPDATE SET
                alias = excluded.alias,
                jvm_id = excluded.jvm_id,
                recordings = excluded.recordings,
                last_reconciled = excluded.last_reconciled
            "#,
        )
        .bind(&row.connect_url)
        .bind(&row.alias)
        .bind(&row.jvm_id)
        .bind(&row.recordings)
        .bind(row.last_reconciled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_unconnected_targets(&self) -> StorageResult<Vec<TargetRecord>> {
        let rows = sqlx::query(
            "SELECT connect_url, alias, jvm_id, recordings, last_reconciled FROM targets WHERE jvm_id IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::target_from_row).collect()
    }

    async fn list_targets(&self) -> StorageResult<Vec<TargetRecord>> {
        let rows = sqlx::query(
            "SELECT connect_url, alias, jvm_id, recordings, last_reconciled FROM targets",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::target_from_row).collect()
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let plugins: i64 = sqlx::query("SELECT COUNT(*) AS n FROM plugins")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        let targets: i64 = sqlx::query("SELECT COUNT(*) AS n FROM targets")
            .fetch_one(&self.pool)
            .await?
            .get("n");

        Ok(HealthStatus {
            healthy: true,
            message: format!(
                "SQLite at {}: {} plugins, {} targets",
                self.db_path, plugins, targets
            ),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing SQLite pool");
        self.pool.close().await;
        Ok(())
    }
}
