//! The local component/measure store.
//!
//! A [`Store`] owns one library root on disk: the `components.sql` index
//! database plus one exclusively-owned directory per installed record at
//! `root/uid/version_id/`. Mutations run the database transaction first and
//! touch the filesystem only after a successful commit, so the index never
//! describes payloads that failed to land.

use crate::db::Database;
use crate::dirs;
use crate::error::{ErrorKind, Result};
use crate::models::{AttributeRow, FileRow, RecordRow};
use bcl_manifest::{Attribute, Environment, FileReference, Manifest, Record, RecordKind};
use exn::ResultExt;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tracing::{debug, error, warn};

/// Filename of the index database inside the library root.
pub const INDEX_FILENAME: &str = "components.sql";
/// Auth keys are fixed-length tokens issued by the registry.
const AUTH_KEY_LEN: usize = 32;

/// Durable, transactional local index plus directory tree for installed
/// components and measures.
///
/// The store is single-writer and process-local: one shared instance per
/// process, mutations serialized by the caller. Swapping the library root is
/// done through [`reinitialize`](Self::reinitialize), which closes the old
/// index before opening the new one.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
    root: PathBuf,
}

impl Store {
    /// Open the store rooted at `root`, creating the directory and the index
    /// database as needed, running schema migrations, and relocating any
    /// legacy pre-versioned payload directories.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.exists() {
            fs::create_dir_all(root).map_err(ErrorKind::from)?;
        }
        let root = root.canonicalize().map_err(ErrorKind::from)?;
        let db = Database::connect(root.join(INDEX_FILENAME)).await?;
        let store = Self { db, root };
        store.relocate_legacy_layouts().await?;
        Ok(store)
    }

    /// Close this store and open a fresh one at a different root.
    ///
    /// The old index handle is fully released before the new root is
    /// touched, so the same instance can even be re-pointed at the root it
    /// already had.
    pub async fn reinitialize(self, root: impl AsRef<Path>) -> Result<Self> {
        self.db.close().await;
        Self::open(root).await
    }

    /// Close the index database. The store must not be used afterwards.
    pub async fn close(&self) {
        self.db.close().await;
    }

    /// The canonicalized library root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory exclusively owned by `record`.
    pub fn directory_of(&self, record: &Record) -> PathBuf {
        self.root.join(record.relative_dir())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Look up a stored record.
    ///
    /// With a version id this is an exact-match lookup. Without one the
    /// policy differs by kind: components return an arbitrary stored version
    /// for the uid, while measures return the version with the most recent
    /// modification date. The asymmetry is long-standing observed behaviour
    /// and is preserved on purpose.
    pub async fn get(&self, kind: RecordKind, uid: &str, version_id: Option<&str>) -> Result<Option<Record>> {
        let row: Option<RecordRow> = match (kind, version_id) {
            (RecordKind::Component, Some(version)) => {
                sqlx::query_as(include_str!("../queries/get_component.sql")).bind(uid).bind(version)
            },
            (RecordKind::Component, None) => sqlx::query_as(include_str!("../queries/get_component_any.sql")).bind(uid),
            (RecordKind::Measure, Some(version)) => {
                sqlx::query_as(include_str!("../queries/get_measure.sql")).bind(uid).bind(version)
            },
            (RecordKind::Measure, None) => sqlx::query_as(include_str!("../queries/get_measure_latest.sql")).bind(uid),
        }
        .fetch_optional(self.db.pool())
        .await
        .or_raise(|| ErrorKind::Database)?;
        row.map(|r| r.into_record(kind)).transpose()
    }

    /// Every stored version of `uid`, in no particular order.
    pub async fn versions_of(&self, kind: RecordKind, uid: &str) -> Result<Vec<Record>> {
        let query = match kind {
            RecordKind::Component => include_str!("../queries/list_component_versions.sql"),
            RecordKind::Measure => include_str!("../queries/list_measure_versions.sql"),
        };
        let rows: Vec<RecordRow> =
            sqlx::query_as(query).bind(uid).fetch_all(self.db.pool()).await.or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(|r| r.into_record(kind)).collect()
    }

    /// The file metadata mirror for one stored record.
    pub async fn files_of(&self, record: &Record) -> Result<Vec<FileReference>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/list_files.sql"))
            .bind(&record.uid)
            .bind(&record.version_id)
            .fetch_all(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(FileReference::from).collect())
    }

    /// The stored attributes of one record, with values reconstructed into
    /// the in-memory sum type.
    pub async fn attributes_of(&self, record: &Record) -> Result<Vec<Attribute>> {
        let rows: Vec<AttributeRow> = sqlx::query_as(include_str!("../queries/list_attributes.sql"))
            .bind(&record.uid)
            .bind(&record.version_id)
            .fetch_all(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Attribute::try_from).collect()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Install a record: transactional row upsert, then payload directory
    /// copy.
    ///
    /// Any existing rows for `(uid, version_id)` are deleted and re-inserted
    /// inside one transaction; a single statement failure rolls the whole
    /// operation back and nothing on disk changes. The copy of `source_dir`
    /// into `root/uid/version_id/` (replacing any prior contents) happens
    /// only after the transaction commits.
    pub async fn add(&self, manifest: &Manifest, source_dir: &Path) -> Result<Record> {
        dirs::validate_id(&manifest.uid)?;
        dirs::validate_id(&manifest.version_id)?;
        let record = manifest.record(UtcDateTime::now());
        let row = RecordRow::try_from(&record)?;

        let mut tx = self.db.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        let result = Self::replace_rows(&mut tx, manifest, &row).await;
        match result {
            Ok(()) => tx.commit().await.or_raise(|| ErrorKind::Database)?,
            Err(e) => {
                Self::rollback_or_abort(tx).await;
                return Err(e);
            },
        }

        dirs::copy_dir_replacing(source_dir, &self.directory_of(&record))?;
        debug!(kind = %manifest.kind, uid = %manifest.uid, version = %manifest.version_id, "installed record");
        Ok(record)
    }

    async fn replace_rows(tx: &mut Transaction<'static, Sqlite>, manifest: &Manifest, row: &RecordRow) -> Result<()> {
        Self::delete_rows(&mut *tx, manifest.kind, &manifest.uid, &manifest.version_id).await?;
        let insert = match manifest.kind {
            RecordKind::Component => sqlx::query(include_str!("../queries/insert_component.sql"))
                .bind(&row.uid)
                .bind(&row.version_id)
                .bind(&row.name)
                .bind(&row.description)
                .bind(row.date_added)
                .bind(row.date_modified),
            RecordKind::Measure => sqlx::query(include_str!("../queries/insert_measure.sql"))
                .bind(&row.uid)
                .bind(&row.version_id)
                .bind(&row.name)
                .bind(&row.description)
                .bind(&row.modeler_description)
                .bind(row.date_added)
                .bind(row.date_modified),
        };
        insert.execute(&mut **tx).await.or_raise(|| ErrorKind::Database)?;
        for file in &manifest.files {
            let file_row = FileRow::new(&manifest.uid, &manifest.version_id, file);
            sqlx::query(include_str!("../queries/insert_file.sql"))
                .bind(&file_row.uid)
                .bind(&file_row.version_id)
                .bind(&file_row.filename)
                .bind(&file_row.filetype)
                .bind(&file_row.usage_type)
                .bind(&file_row.checksum)
                .execute(&mut **tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        for attribute in &manifest.attributes {
            let attr_row = AttributeRow::new(&manifest.uid, &manifest.version_id, attribute);
            sqlx::query(include_str!("../queries/insert_attribute.sql"))
                .bind(&attr_row.uid)
                .bind(&attr_row.version_id)
                .bind(&attr_row.name)
                .bind(&attr_row.value)
                .bind(&attr_row.units)
                .bind(&attr_row.type_tag)
                .execute(&mut **tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        Ok(())
    }

    async fn delete_rows(conn: &mut SqliteConnection, kind: RecordKind, uid: &str, version_id: &str) -> Result<u64> {
        let table = match kind {
            RecordKind::Component => "DELETE FROM components WHERE uid = ? AND version_id = ?",
            RecordKind::Measure => "DELETE FROM measures WHERE uid = ? AND version_id = ?",
        };
        let deleted = sqlx::query(table)
            .bind(uid)
            .bind(version_id)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?
            .rows_affected();
        sqlx::query("DELETE FROM files WHERE uid = ? AND version_id = ?")
            .bind(uid)
            .bind(version_id)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query("DELETE FROM attributes WHERE uid = ? AND version_id = ?")
            .bind(uid)
            .bind(version_id)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(deleted)
    }

    /// Remove one stored version.
    ///
    /// Rows are deleted transactionally; the on-disk directory goes away
    /// only on commit success. Removing the last version of a uid also
    /// removes the now-empty uid directory.
    ///
    /// Returns `true` if a record existed and was removed.
    pub async fn remove(&self, kind: RecordKind, uid: &str, version_id: &str) -> Result<bool> {
        dirs::validate_id(uid)?;
        dirs::validate_id(version_id)?;
        let mut tx = self.db.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        let result = Self::delete_rows(&mut tx, kind, uid, version_id).await;
        let deleted = match result {
            Ok(deleted) => {
                tx.commit().await.or_raise(|| ErrorKind::Database)?;
                deleted
            },
            Err(e) => {
                Self::rollback_or_abort(tx).await;
                return Err(e);
            },
        };
        dirs::remove_version_dir(&self.root, uid, version_id)?;
        Ok(deleted > 0)
    }

    /// Remove every stored version of `uid` except `keep_version_id`.
    ///
    /// Returns the number of versions removed.
    pub async fn remove_outdated(&self, kind: RecordKind, uid: &str, keep_version_id: &str) -> Result<usize> {
        let mut removed = 0;
        for record in self.versions_of(kind, uid).await? {
            if record.version_id != keep_version_id && self.remove(kind, uid, &record.version_id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Substring search over name and description (and modeler description,
    /// for measures).
    pub async fn search(&self, kind: RecordKind, needle: &str) -> Result<Vec<Record>> {
        let query = match kind {
            RecordKind::Component => include_str!("../queries/search_components.sql"),
            RecordKind::Measure => include_str!("../queries/search_measures.sql"),
        };
        let pattern = format!("%{}%", escape_like(needle));
        let rows: Vec<RecordRow> =
            sqlx::query_as(query).bind(pattern).fetch_all(self.db.pool()).await.or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(|r| r.into_record(kind)).collect()
    }

    /// Attribute search with AND semantics across predicates.
    ///
    /// Starts from the universal set of stored `(uid, version_id)` pairs for
    /// `kind`, then intersects it with the pairs matching each `(name,
    /// value)` predicate in turn, short-circuiting to empty the moment any
    /// predicate matches nothing. Intersection happens client-side rather
    /// than in a single join. Zero predicates returns the universal set.
    pub async fn attribute_search(
        &self,
        kind: RecordKind,
        predicates: &[(String, String)],
    ) -> Result<Vec<(String, String)>> {
        let universe = match kind {
            RecordKind::Component => "SELECT uid, version_id FROM components",
            RecordKind::Measure => "SELECT uid, version_id FROM measures",
        };
        let mut result: BTreeSet<(String, String)> = sqlx::query_as(universe)
            .fetch_all(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?
            .into_iter()
            .collect();
        for (name, value) in predicates {
            if result.is_empty() {
                break;
            }
            let matching: HashSet<(String, String)> = sqlx::query_as(
                "SELECT uid, version_id FROM attributes WHERE name = ?1 COLLATE NOCASE AND value = ?2",
            )
            .bind(name)
            .bind(value)
            .fetch_all(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?
            .into_iter()
            .collect();
            if matching.is_empty() {
                return Ok(Vec::new());
            }
            result.retain(|pair| matching.contains(pair));
        }
        Ok(result.into_iter().collect())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Persist the auth key for one registry environment.
    ///
    /// Keys are fixed-length tokens; anything else is rejected without
    /// touching the previously stored key.
    pub async fn set_auth_key(&self, env: Environment, key: &str) -> Result<()> {
        if key.len() != AUTH_KEY_LEN {
            exn::bail!(ErrorKind::InvalidData("auth key length"));
        }
        let mut tx = self.db.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        let result = sqlx::query("INSERT OR REPLACE INTO settings (name, data) VALUES (?, ?)")
            .bind(Self::auth_key_setting(env))
            .bind(key)
            .execute(&mut *tx)
            .await;
        match result {
            Ok(_) => tx.commit().await.or_raise(|| ErrorKind::Database)?,
            Err(e) => {
                Self::rollback_or_abort(tx).await;
                return Err(e).or_raise(|| ErrorKind::Database);
            },
        }
        Ok(())
    }

    /// The stored auth key for `env`; empty until one has been set.
    pub async fn auth_key(&self, env: Environment) -> Result<String> {
        let key: Option<String> = sqlx::query_scalar("SELECT data FROM settings WHERE name = ?")
            .bind(Self::auth_key_setting(env))
            .fetch_optional(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(key.unwrap_or_default())
    }

    fn auth_key_setting(env: Environment) -> &'static str {
        match env {
            Environment::Production => "auth_key_production",
            Environment::Development => "auth_key_development",
        }
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    /// A rollback that fails leaves the index in an unknowable half-applied
    /// state; continuing would risk silently corrupting the library, so the
    /// process aborts instead.
    async fn rollback_or_abort(tx: Transaction<'static, Sqlite>) {
        if let Err(e) = tx.rollback().await {
            error!(error = %e, "transaction rollback failed; store state is unrecoverable");
            std::process::abort();
        }
    }

    /// Move pre-versioned payload directories (`root/uid/` holding a manifest
    /// directly) into the `root/uid/version_id/` layout, using the indexed
    /// version id. Directories with no indexed version are left alone.
    async fn relocate_legacy_layouts(&self) -> Result<()> {
        for entry in fs::read_dir(&self.root).map_err(ErrorKind::from)? {
            let entry = entry.map_err(ErrorKind::from)?;
            if !entry.file_type().map_err(ErrorKind::from)?.is_dir() {
                continue;
            }
            let uid_dir = entry.path();
            let is_legacy = [RecordKind::Component, RecordKind::Measure]
                .iter()
                .any(|kind| uid_dir.join(kind.manifest_filename()).is_file());
            if !is_legacy {
                continue;
            }
            let Some(uid) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let version_id: Option<String> = sqlx::query_scalar(
                "SELECT version_id FROM components WHERE uid = ?1
                 UNION ALL
                 SELECT version_id FROM measures WHERE uid = ?1
                 LIMIT 1",
            )
            .bind(&uid)
            .fetch_optional(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
            match version_id {
                Some(version_id) if !version_id.is_empty() => {
                    debug!(%uid, %version_id, "relocating legacy payload directory");
                    dirs::push_down_into_version(&uid_dir, &version_id)?;
                },
                _ => warn!(%uid, "legacy payload directory has no indexed version; leaving in place"),
            }
        }
        Ok(())
    }
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
