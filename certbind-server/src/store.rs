//! Persistent certificate association storage with SQLite.
//!
//! Every conditional bind is a single `INSERT ... SELECT ... WHERE NOT EXISTS`
//! statement, so the condition and the write cannot be interleaved with
//! another request.

use std::path::Path;

use async_trait::async_trait;
use certbind_auth::{BindMode, CertAuthStore, StoreError};
use certbind_core::{CertHash, EnrollId, EnrollType};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

/// Persistent storage for certificate hash associations.
#[derive(Clone)]
pub struct SqliteCertAuthStore {
    pool: SqlitePool,
}

/// Record of one association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationRecord {
    pub enroll_id: EnrollId,
    pub cert_hash: CertHash,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SqliteCertAuthStore {
    /// Create a new store with the given database pool.
    ///
    /// Creates the table if it doesn't exist.
    pub async fn new(pool: SqlitePool) -> Result<Self, SqliteStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cert_auth_associations (
                enroll_id TEXT NOT NULL,
                enroll_type TEXT NOT NULL,
                cert_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (enroll_id, enroll_type)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS cert_auth_associations_hash
             ON cert_auth_associations (cert_hash)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Open or create a database at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SqliteStoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                sqlx::Error::Configuration(format!("Failed to create db directory: {}", e).into())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // Single writer: conditional binds never race each other.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::new(pool).await
    }

    /// List every association, oldest first.
    pub async fn list_associations(&self) -> Result<Vec<AssociationRecord>, SqliteStoreError> {
        let rows = sqlx::query(
            "SELECT enroll_id, enroll_type, cert_hash, created_at, updated_at
             FROM cert_auth_associations ORDER BY created_at, enroll_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_record).collect()
    }

    /// Associations of an enrollment identifier, across enrollment types.
    pub async fn find_by_enroll_id(
        &self,
        id: &str,
    ) -> Result<Vec<AssociationRecord>, SqliteStoreError> {
        let rows = sqlx::query(
            "SELECT enroll_id, enroll_type, cert_hash, created_at, updated_at
             FROM cert_auth_associations WHERE enroll_id = ? ORDER BY enroll_type",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_record).collect()
    }

    /// Enrollments bound to a hash.
    pub async fn find_by_cert_hash(
        &self,
        hash: &CertHash,
    ) -> Result<Vec<AssociationRecord>, SqliteStoreError> {
        let rows = sqlx::query(
            "SELECT enroll_id, enroll_type, cert_hash, created_at, updated_at
             FROM cert_auth_associations WHERE cert_hash = ? ORDER BY created_at, enroll_id",
        )
        .bind(hash.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_record).collect()
    }

    async fn count(&self, sql: &str, binds: &[&str]) -> Result<bool, SqliteStoreError> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let row = query.fetch_one(&self.pool).await?;
        let n: i64 = row.get(0);
        Ok(n > 0)
    }

    async fn bind(
        &self,
        id: &EnrollId,
        hash: &CertHash,
        mode: BindMode,
    ) -> Result<u64, SqliteStoreError> {
        let now = current_timestamp();

        let sql = match mode {
            BindMode::Shared => {
                r#"
                INSERT INTO cert_auth_associations
                    (enroll_id, enroll_type, cert_hash, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4)
                ON CONFLICT (enroll_id, enroll_type) DO UPDATE
                SET cert_hash = excluded.cert_hash, updated_at = excluded.updated_at
                "#
            }
            BindMode::Exclusive => {
                r#"
                INSERT INTO cert_auth_associations
                    (enroll_id, enroll_type, cert_hash, created_at, updated_at)
                SELECT ?1, ?2, ?3, ?4, ?4
                WHERE NOT EXISTS (
                    SELECT 1 FROM cert_auth_associations
                    WHERE cert_hash = ?3 AND NOT (enroll_id = ?1 AND enroll_type = ?2)
                )
                ON CONFLICT (enroll_id, enroll_type) DO UPDATE
                SET cert_hash = excluded.cert_hash, updated_at = excluded.updated_at
                "#
            }
            BindMode::FirstBind => {
                r#"
                INSERT INTO cert_auth_associations
                    (enroll_id, enroll_type, cert_hash, created_at, updated_at)
                SELECT ?1, ?2, ?3, ?4, ?4
                WHERE NOT EXISTS (
                    SELECT 1 FROM cert_auth_associations WHERE cert_hash = ?3
                )
                ON CONFLICT (enroll_id, enroll_type) DO NOTHING
                "#
            }
        };

        let result = sqlx::query(sql)
            .bind(&id.id)
            .bind(id.enroll_type.as_str())
            .bind(hash.as_str())
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CertAuthStore for SqliteCertAuthStore {
    async fn has_cert_hash(&self, hash: &CertHash) -> Result<bool, StoreError> {
        Ok(self
            .count(
                "SELECT COUNT(*) FROM cert_auth_associations WHERE cert_hash = ?",
                &[hash.as_str()],
            )
            .await?)
    }

    async fn is_cert_hash_associated(
        &self,
        id: &EnrollId,
        hash: &CertHash,
    ) -> Result<bool, StoreError> {
        Ok(self
            .count(
                "SELECT COUNT(*) FROM cert_auth_associations
                 WHERE enroll_id = ? AND enroll_type = ? AND cert_hash = ?",
                &[&id.id, id.enroll_type.as_str(), hash.as_str()],
            )
            .await?)
    }

    async fn enrollment_has_cert_hash(
        &self,
        id: &EnrollId,
        _hash: &CertHash,
    ) -> Result<bool, StoreError> {
        Ok(self
            .count(
                "SELECT COUNT(*) FROM cert_auth_associations
                 WHERE enroll_id = ? AND enroll_type = ?",
                &[&id.id, id.enroll_type.as_str()],
            )
            .await?)
    }

    async fn associate_cert_hash(
        &self,
        id: &EnrollId,
        hash: &CertHash,
        mode: BindMode,
    ) -> Result<(), StoreError> {
        if self.bind(id, hash, mode).await? > 0 {
            tracing::debug!(id = %id, hash = %hash, mode = ?mode, "cert hash association stored");
            return Ok(());
        }
        // The condition failed, unless this exact pair was already bound.
        if self.is_cert_hash_associated(id, hash).await? {
            return Ok(());
        }
        Err(StoreError::Conflict)
    }
}

fn parse_record(row: &sqlx::sqlite::SqliteRow) -> Result<AssociationRecord, SqliteStoreError> {
    let enroll_type: String = row.get("enroll_type");
    let enroll_type =
        EnrollType::parse(&enroll_type).ok_or(SqliteStoreError::InvalidRecord(enroll_type))?;
    let cert_hash: String = row.get("cert_hash");
    let cert_hash =
        CertHash::parse(&cert_hash).map_err(|_| SqliteStoreError::InvalidRecord(cert_hash))?;

    Ok(AssociationRecord {
        enroll_id: EnrollId::new(row.get::<String, _>("enroll_id"), enroll_type),
        cert_hash,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Errors that can occur during association store operations.
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid stored association value: {0:?}")]
    InvalidRecord(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        StoreError::backend(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteCertAuthStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteCertAuthStore::new(pool).await.unwrap()
    }

    fn id(s: &str) -> EnrollId {
        EnrollId::new(s, EnrollType::Device)
    }

    fn hash(c: char) -> CertHash {
        CertHash::parse(&c.to_string().repeat(64)).unwrap()
    }

    #[tokio::test]
    async fn test_predicates_on_empty_store() {
        let store = test_store().await;
        assert!(!store.has_cert_hash(&hash('a')).await.unwrap());
        assert!(!store.is_cert_hash_associated(&id("A"), &hash('a')).await.unwrap());
        assert!(!store.enrollment_has_cert_hash(&id("A"), &hash('a')).await.unwrap());
        assert!(store.list_associations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exclusive_bind() {
        let store = test_store().await;
        store
            .associate_cert_hash(&id("A"), &hash('a'), BindMode::Exclusive)
            .await
            .unwrap();

        assert!(store.has_cert_hash(&hash('a')).await.unwrap());
        assert!(store.is_cert_hash_associated(&id("A"), &hash('a')).await.unwrap());

        // Idempotent for the same pair.
        store
            .associate_cert_hash(&id("A"), &hash('a'), BindMode::Exclusive)
            .await
            .unwrap();

        let conflict = store
            .associate_cert_hash(&id("B"), &hash('a'), BindMode::Exclusive)
            .await;
        assert!(matches!(conflict, Err(StoreError::Conflict)));
        assert_eq!(store.list_associations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exclusive_rebind_replaces_hash() {
        let store = test_store().await;
        store
            .associate_cert_hash(&id("A"), &hash('a'), BindMode::Exclusive)
            .await
            .unwrap();
        store
            .associate_cert_hash(&id("A"), &hash('b'), BindMode::Exclusive)
            .await
            .unwrap();

        let records = store.find_by_enroll_id("A").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cert_hash, hash('b'));
        assert!(!store.has_cert_hash(&hash('a')).await.unwrap());
    }

    #[tokio::test]
    async fn test_shared_bind_allows_duplicates() {
        let store = test_store().await;
        for name in ["A", "B"] {
            store
                .associate_cert_hash(&id(name), &hash('a'), BindMode::Shared)
                .await
                .unwrap();
        }
        let holders = store.find_by_cert_hash(&hash('a')).await.unwrap();
        let ids: Vec<_> = holders.iter().map(|r| r.enroll_id.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_first_bind_conditions() {
        let store = test_store().await;
        store
            .associate_cert_hash(&id("A"), &hash('a'), BindMode::FirstBind)
            .await
            .unwrap();
        store
            .associate_cert_hash(&id("A"), &hash('a'), BindMode::FirstBind)
            .await
            .unwrap();

        let swap = store
            .associate_cert_hash(&id("A"), &hash('b'), BindMode::FirstBind)
            .await;
        assert!(matches!(swap, Err(StoreError::Conflict)));

        let reuse = store
            .associate_cert_hash(&id("B"), &hash('a'), BindMode::FirstBind)
            .await;
        assert!(matches!(reuse, Err(StoreError::Conflict)));

        assert_eq!(
            store.find_by_enroll_id("A").await.unwrap()[0].cert_hash,
            hash('a')
        );
    }

    #[tokio::test]
    async fn test_enrollment_type_is_part_of_key() {
        let store = test_store().await;
        let device = EnrollId::new("X", EnrollType::Device);
        let byod = EnrollId::new("X", EnrollType::UserEnrollmentDevice);

        store
            .associate_cert_hash(&device, &hash('a'), BindMode::Exclusive)
            .await
            .unwrap();
        assert!(!store.enrollment_has_cert_hash(&byod, &hash('a')).await.unwrap());

        store
            .associate_cert_hash(&byod, &hash('b'), BindMode::Exclusive)
            .await
            .unwrap();
        let records = store.find_by_enroll_id("X").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].enroll_id, device);
        assert_eq!(records[1].enroll_id, byod);
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = std::env::temp_dir().join(format!("certbind-test-{}", std::process::id()));
        let path = dir.join("nested").join("certauth.db");
        let _ = std::fs::remove_dir_all(&dir);

        let store = SqliteCertAuthStore::open(&path).await.unwrap();
        store
            .associate_cert_hash(&id("A"), &hash('c'), BindMode::Exclusive)
            .await
            .unwrap();
        assert!(path.exists());

        drop(store);
        let reopened = SqliteCertAuthStore::open(&path).await.unwrap();
        assert!(reopened.has_cert_hash(&hash('c')).await.unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_reported() {
        let store = test_store().await;
        sqlx::query(
            "INSERT INTO cert_auth_associations VALUES ('A', 'printer', ?, 0, 0)",
        )
        .bind(hash('a').as_str())
        .execute(&store.pool)
        .await
        .unwrap();

        let result = store.list_associations().await;
        assert!(matches!(result, Err(SqliteStoreError::InvalidRecord(v)) if v == "printer"));
    }
}
