use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use stockplan_core::domain::unit::{ResolvedUnit, Unit, UnitId, UnitRef};

use super::{RepositoryError, UnitRepository};
use crate::DbPool;

/// Canonical packaging units shipped with a fresh database.
pub const DEFAULT_UNITS: &[(i64, &str)] = &[
    (1, "กล่อง"),
    (2, "ขวด"),
    (3, "ชิ้น"),
    (4, "แผง"),
    (5, "หลอด"),
    (6, "ซอง"),
    (7, "ม้วน"),
    (8, "แพ็ค"),
    (9, "ขวดแก้ว"),
    (10, "ถุง"),
];

pub struct SqlUnitRepository {
    pool: DbPool,
}

impl SqlUnitRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts the default unit set, leaving existing ids untouched. Returns rows added.
    pub async fn seed_defaults(&self) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for (id, name) in DEFAULT_UNITS {
            inserted += sqlx::query("INSERT OR IGNORE INTO unit (id, name) VALUES (?, ?)")
                .bind(*id)
                .bind(*name)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

/// Maps a caller's unit reference to a canonical id.
///
/// Numeric ids are trusted verbatim. Names match the trimmed stored name exactly and
/// ties go to the lowest id. Unknown names resolve to no unit rather than failing.
pub async fn resolve(
    conn: &mut SqliteConnection,
    unit: Option<&UnitRef>,
) -> Result<ResolvedUnit, RepositoryError> {
    let name = match unit {
        None => return Ok(ResolvedUnit(None)),
        Some(UnitRef::Id(id)) => return Ok(ResolvedUnit(Some(*id))),
        Some(UnitRef::Name(name)) => name.trim(),
    };
    if name.is_empty() {
        return Ok(ResolvedUnit(None));
    }

    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM unit WHERE TRIM(name) = ? ORDER BY id ASC LIMIT 1")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(ResolvedUnit(id.map(UnitId)))
}

fn unit_from_row(row: &SqliteRow) -> Result<Unit, RepositoryError> {
    Ok(Unit { id: UnitId(row.try_get("id")?), name: row.try_get("name")? })
}

#[async_trait::async_trait]
impl UnitRepository for SqlUnitRepository {
    async fn resolve(&self, unit: Option<&UnitRef>) -> Result<ResolvedUnit, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        resolve(&mut *conn, unit).await
    }

    async fn list(&self) -> Result<Vec<Unit>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name FROM unit ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(unit_from_row).collect()
    }

    async fn save(&self, unit: Unit) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO unit (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(unit.id.0)
        .bind(&unit.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use stockplan_core::domain::unit::{ResolvedUnit, Unit, UnitId, UnitRef};

    use super::{SqlUnitRepository, DEFAULT_UNITS};
    use crate::repositories::UnitRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlUnitRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlUnitRepository::new(pool)
    }

    #[tokio::test]
    async fn names_resolve_to_lowest_matching_id() {
        let repo = setup().await;
        repo.save(Unit { id: UnitId(9), name: " กล่อง ".to_string() }).await.expect("save");
        repo.save(Unit { id: UnitId(4), name: "กล่อง".to_string() }).await.expect("save");
        repo.save(Unit { id: UnitId(2), name: "ขวด".to_string() }).await.expect("save");

        let resolved = repo.resolve(Some(&UnitRef::Name("กล่อง".to_string()))).await.expect("resolve");
        assert_eq!(resolved, ResolvedUnit(Some(UnitId(4))));
    }

    #[tokio::test]
    async fn matching_is_case_sensitive_and_misses_are_unresolved() {
        let repo = setup().await;
        repo.save(Unit { id: UnitId(1), name: "Box".to_string() }).await.expect("save");

        let resolved = repo.resolve(Some(&UnitRef::Name("box".to_string()))).await.expect("resolve");
        assert_eq!(resolved, ResolvedUnit(None));
        assert_eq!(repo.resolve(None).await.expect("resolve"), ResolvedUnit(None));
    }

    #[tokio::test]
    async fn numeric_ids_are_trusted_without_lookup() {
        let repo = setup().await;
        let resolved = repo.resolve(Some(&UnitRef::Id(UnitId(77)))).await.expect("resolve");
        assert_eq!(resolved, ResolvedUnit(Some(UnitId(77))));
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let repo = setup().await;
        assert_eq!(repo.seed_defaults().await.expect("seed"), DEFAULT_UNITS.len() as u64);
        assert_eq!(repo.seed_defaults().await.expect("reseed"), 0);
        assert_eq!(repo.list().await.expect("list").len(), DEFAULT_UNITS.len());
    }
}
