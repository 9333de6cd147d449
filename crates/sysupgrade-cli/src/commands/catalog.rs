//! Catalog commands.

use anyhow::Result;
use sysupgrade_db::{CatalogRepo, PgCatalogRepo};

use super::{Context, print_json};

pub async fn releases(ctx: &Context, distro: Option<&str>) -> Result<()> {
    let repo = PgCatalogRepo::new(ctx.pool.clone());
    let releases = repo.get_releases(distro).await?;
    print_json(&releases)
}

pub async fn targets(ctx: &Context, distro: &str, release: &str) -> Result<()> {
    let repo = PgCatalogRepo::new(ctx.pool.clone());
    let targets = repo.get_targets(distro, release).await?;
    print_json(&targets)
}
