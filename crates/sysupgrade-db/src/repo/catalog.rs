//! Catalog repository: releases, targets, profiles and packages.
//!
//! The build queue never touches these tables. Request handlers query them to
//! validate a build request before it is submitted.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sysupgrade_core::TargetCoords;
use tracing::{debug, info, warn};

use crate::{DbError, DbResult};

/// PostgreSQL accepts at most this many bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// A release of a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Release {
    pub distro: String,
    pub release: String,
}

/// A target/subtarget pair of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TargetRecord {
    pub target: String,
    pub subtarget: String,
    pub supported: bool,
}

/// A device profile of a subtarget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub name: String,
    pub board: String,
}

#[async_trait]
pub trait CatalogRepo: Send + Sync {
    async fn insert_release(&self, distro: &str, release: &str) -> DbResult<()>;
    /// All releases, or only those of `distro`.
    async fn get_releases(&self, distro: Option<&str>) -> DbResult<Vec<Release>>;

    async fn insert_targets(
        &self,
        distro: &str,
        release: &str,
        target: &str,
        subtargets: &[String],
    ) -> DbResult<()>;
    /// Flag matching targets as supported. `subtarget_pattern` is a `LIKE`
    /// pattern, `%` matches every subtarget.
    async fn mark_supported(
        &self,
        distro: &str,
        release: &str,
        target: &str,
        subtarget_pattern: &str,
    ) -> DbResult<u64>;
    async fn get_targets(&self, distro: &str, release: &str) -> DbResult<Vec<TargetRecord>>;
    async fn check_target(&self, coords: &TargetCoords) -> DbResult<bool>;

    async fn insert_profiles(
        &self,
        coords: &TargetCoords,
        default_packages: &[String],
        profiles: &[Profile],
    ) -> DbResult<()>;
    /// Whether `profile` names a profile or a board of the subtarget.
    async fn check_profile(&self, coords: &TargetCoords, profile: &str) -> DbResult<bool>;
    async fn get_default_packages(&self, coords: &TargetCoords) -> DbResult<Option<Vec<String>>>;

    /// Store (name, version) pairs, replacing known versions. When a name
    /// repeats, its last version wins.
    async fn insert_packages(
        &self,
        coords: &TargetCoords,
        packages: &[(String, String)],
    ) -> DbResult<()>;
    async fn get_available_packages(
        &self,
        coords: &TargetCoords,
    ) -> DbResult<BTreeMap<String, String>>;

    /// Remember which package list produced a hash.
    async fn insert_package_hash(&self, hash: &str, packages: &[String]) -> DbResult<()>;
}

/// PostgreSQL implementation of CatalogRepo.
pub struct PgCatalogRepo {
    pool: PgPool,
}

impl PgCatalogRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepo for PgCatalogRepo {
    async fn insert_release(&self, distro: &str, release: &str) -> DbResult<()> {
        info!(distro, release, "Inserting release");
        sqlx::query(
            "INSERT INTO releases (distro, release) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(distro)
        .bind(release)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_releases(&self, distro: Option<&str>) -> DbResult<Vec<Release>> {
        let releases = if let Some(distro) = distro {
            sqlx::query_as::<_, Release>(
                "SELECT distro, release FROM releases WHERE distro = $1 ORDER BY release",
            )
            .bind(distro)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, Release>(
                "SELECT distro, release FROM releases ORDER BY distro, release",
            )
            .fetch_all(&self.pool)
            .await?
        };
        Ok(releases)
    }

    async fn insert_targets(
        &self,
        distro: &str,
        release: &str,
        target: &str,
        subtargets: &[String],
    ) -> DbResult<()> {
        if subtargets.is_empty() {
            return Ok(());
        }
        info!(distro, release, target, subtargets = %subtargets.join(" "), "Inserting targets");

        let mut tx = self.pool.begin().await?;
        for chunk in subtargets.chunks(MAX_BIND_PARAMS / 4) {
            let mut query_builder =
                sqlx::QueryBuilder::new("INSERT INTO targets (distro, release, target, subtarget) ");
            query_builder.push_values(chunk, |mut b, subtarget| {
                b.push_bind(distro)
                    .push_bind(release)
                    .push_bind(target)
                    .push_bind(subtarget);
            });
            query_builder.push(" ON CONFLICT DO NOTHING");
            query_builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_supported(
        &self,
        distro: &str,
        release: &str,
        target: &str,
        subtarget_pattern: &str,
    ) -> DbResult<u64> {
        info!(distro, release, target, subtarget = subtarget_pattern, "Marking targets supported");
        let result = sqlx::query(
            r#"
            UPDATE targets SET supported = TRUE
            WHERE distro = $1 AND release = $2 AND target = $3 AND subtarget LIKE $4
            "#,
        )
        .bind(distro)
        .bind(release)
        .bind(target)
        .bind(subtarget_pattern)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_targets(&self, distro: &str, release: &str) -> DbResult<Vec<TargetRecord>> {
        let targets = sqlx::query_as::<_, TargetRecord>(
            r#"
            SELECT target, subtarget, supported
            FROM targets
            WHERE distro = $1 AND release = $2
            ORDER BY target, subtarget
            "#,
        )
        .bind(distro)
        .bind(release)
        .fetch_all(&self.pool)
        .await?;
        Ok(targets)
    }

    async fn check_target(&self, coords: &TargetCoords) -> DbResult<bool> {
        debug!(?coords, "Checking target");
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM targets
                WHERE distro = $1 AND release = $2 AND target = $3 AND subtarget = $4
            )
            "#,
        )
        .bind(&coords.distro)
        .bind(&coords.release)
        .bind(&coords.target)
        .bind(&coords.subtarget)
        .fetch_one(&self.pool)
        .await?;

        if !exists {
            warn!(?coords, "Unknown target");
        }
        Ok(exists)
    }

    async fn insert_profiles(
        &self,
        coords: &TargetCoords,
        default_packages: &[String],
        profiles: &[Profile],
    ) -> DbResult<()> {
        debug!(?coords, count = profiles.len(), "Inserting profiles");
        let mut tx = self.pool.begin().await?;

        for profile in profiles {
            let result = sqlx::query(
                r#"
                INSERT INTO profiles (distro, release, target, subtarget, name, board)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&coords.distro)
            .bind(&coords.release)
            .bind(&coords.target)
            .bind(&coords.subtarget)
            .bind(&profile.name)
            .bind(&profile.board)
            .execute(&mut *tx)
            .await;

            if let Err(sqlx::Error::Database(db_err)) = &result {
                if db_err.is_unique_violation() {
                    return Err(DbError::Duplicate(format!(
                        "profile {} of {}/{}/{}/{}",
                        profile.name,
                        coords.distro,
                        coords.release,
                        coords.target,
                        coords.subtarget
                    )));
                }
            }
            result?;
        }

        sqlx::query(
            r#"
            INSERT INTO default_packages (distro, release, target, subtarget, packages)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (distro, release, target, subtarget)
            DO UPDATE SET packages = EXCLUDED.packages
            "#,
        )
        .bind(&coords.distro)
        .bind(&coords.release)
        .bind(&coords.target)
        .bind(&coords.subtarget)
        .bind(default_packages.join(" "))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn check_profile(&self, coords: &TargetCoords, profile: &str) -> DbResult<bool> {
        debug!(?coords, profile, "Checking profile");
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM profiles
                WHERE distro = $1 AND release = $2 AND target = $3 AND subtarget = $4
                    AND (name = $5 OR board = $5)
            )
            "#,
        )
        .bind(&coords.distro)
        .bind(&coords.release)
        .bind(&coords.target)
        .bind(&coords.subtarget)
        .bind(profile)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn get_default_packages(&self, coords: &TargetCoords) -> DbResult<Option<Vec<String>>> {
        let packages = sqlx::query_scalar::<_, String>(
            r#"
            SELECT packages FROM default_packages
            WHERE distro = $1 AND release = $2 AND target = $3 AND subtarget = $4
            "#,
        )
        .bind(&coords.distro)
        .bind(&coords.release)
        .bind(&coords.target)
        .bind(&coords.subtarget)
        .fetch_optional(&self.pool)
        .await?;

        Ok(packages.map(|p| p.split_whitespace().map(String::from).collect()))
    }

    async fn insert_packages(
        &self,
        coords: &TargetCoords,
        packages: &[(String, String)],
    ) -> DbResult<()> {
        if packages.is_empty() {
            return Ok(());
        }
        // A name listed twice would make the upsert touch one row twice.
        let latest: BTreeMap<&str, &str> = packages
            .iter()
            .map(|(name, version)| (name.as_str(), version.as_str()))
            .collect();
        let rows: Vec<(&str, &str)> = latest.into_iter().collect();
        info!(?coords, count = rows.len(), "Inserting packages");

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(MAX_BIND_PARAMS / 6) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO packages (distro, release, target, subtarget, name, version) ",
            );
            query_builder.push_values(chunk, |mut b, (name, version)| {
                b.push_bind(&coords.distro)
                    .push_bind(&coords.release)
                    .push_bind(&coords.target)
                    .push_bind(&coords.subtarget)
                    .push_bind(*name)
                    .push_bind(*version);
            });
            query_builder.push(
                " ON CONFLICT (distro, release, target, subtarget, name) DO UPDATE SET version = EXCLUDED.version",
            );
            query_builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_available_packages(
        &self,
        coords: &TargetCoords,
    ) -> DbResult<BTreeMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT name, version FROM packages
            WHERE distro = $1 AND release = $2 AND target = $3 AND subtarget = $4
            "#,
        )
        .bind(&coords.distro)
        .bind(&coords.release)
        .bind(&coords.target)
        .bind(&coords.subtarget)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_package_hash(&self, hash: &str, packages: &[String]) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO packages_hashes (hash, packages) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(hash)
        .bind(packages.join(" "))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
