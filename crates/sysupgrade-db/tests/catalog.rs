//! Catalog repository tests against PostgreSQL.
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p sysupgrade-db -- --ignored

use sqlx::PgPool;
use sysupgrade_core::TargetCoords;
use sysupgrade_db::{CatalogRepo, DbError, PgCatalogRepo, Profile};

fn coords() -> TargetCoords {
    TargetCoords::new("openwrt", "23.05", "x86", "64")
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[sqlx::test(migrator = "sysupgrade_db::MIGRATOR")]
#[ignore]
async fn test_releases(pool: PgPool) {
    let repo = PgCatalogRepo::new(pool);
    repo.insert_release("openwrt", "23.05").await.unwrap();
    repo.insert_release("openwrt", "23.05").await.unwrap();
    repo.insert_release("openwrt", "22.03").await.unwrap();
    repo.insert_release("lede", "17.01").await.unwrap();

    let all = repo.get_releases(None).await.unwrap();
    assert_eq!(all.len(), 3);

    let openwrt: Vec<_> = repo
        .get_releases(Some("openwrt"))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.release)
        .collect();
    assert_eq!(openwrt, vec!["22.03", "23.05"]);
}

#[sqlx::test(migrator = "sysupgrade_db::MIGRATOR")]
#[ignore]
async fn test_targets_and_support_pattern(pool: PgPool) {
    let repo = PgCatalogRepo::new(pool);
    repo.insert_targets("openwrt", "23.05", "x86", &strings(&["64", "generic", "geode"]))
        .await
        .unwrap();
    repo.insert_targets("openwrt", "23.05", "x86", &strings(&["64"]))
        .await
        .unwrap();

    assert!(repo.check_target(&coords()).await.unwrap());
    assert!(
        !repo
            .check_target(&TargetCoords::new("openwrt", "23.05", "x86", "legacy"))
            .await
            .unwrap()
    );

    let marked = repo
        .mark_supported("openwrt", "23.05", "x86", "ge%")
        .await
        .unwrap();
    assert_eq!(marked, 2);

    let targets = repo.get_targets("openwrt", "23.05").await.unwrap();
    let supported: Vec<_> = targets
        .iter()
        .filter(|t| t.supported)
        .map(|t| t.subtarget.as_str())
        .collect();
    assert_eq!(supported, vec!["generic", "geode"]);

    let all = repo.mark_supported("openwrt", "23.05", "x86", "%").await.unwrap();
    assert_eq!(all, 3);
}

#[sqlx::test(migrator = "sysupgrade_db::MIGRATOR")]
#[ignore]
async fn test_profiles_and_default_packages(pool: PgPool) {
    let repo = PgCatalogRepo::new(pool);
    let profiles = vec![Profile {
        name: "generic".to_string(),
        board: "x86-64".to_string(),
    }];
    repo.insert_profiles(&coords(), &strings(&["base-files", "kernel"]), &profiles)
        .await
        .unwrap();

    assert!(repo.check_profile(&coords(), "generic").await.unwrap());
    assert!(repo.check_profile(&coords(), "x86-64").await.unwrap());
    assert!(!repo.check_profile(&coords(), "tplink").await.unwrap());

    assert_eq!(
        repo.get_default_packages(&coords()).await.unwrap(),
        Some(strings(&["base-files", "kernel"]))
    );
    assert_eq!(
        repo.get_default_packages(&TargetCoords::new("openwrt", "23.05", "ath79", "generic"))
            .await
            .unwrap(),
        None
    );

    let err = repo
        .insert_profiles(&coords(), &[], &profiles)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Duplicate(_)));
}

#[sqlx::test(migrator = "sysupgrade_db::MIGRATOR")]
#[ignore]
async fn test_available_packages(pool: PgPool) {
    let repo = PgCatalogRepo::new(pool);
    let packages = vec![
        ("kernel".to_string(), "5.15.1".to_string()),
        ("luci".to_string(), "git-23.1".to_string()),
    ];
    repo.insert_packages(&coords(), &packages).await.unwrap();
    repo.insert_packages(&coords(), &[("kernel".to_string(), "5.15.2".to_string())])
        .await
        .unwrap();

    let available = repo.get_available_packages(&coords()).await.unwrap();
    assert_eq!(available.len(), 2);
    assert_eq!(available["kernel"], "5.15.2");
    assert_eq!(available["luci"], "git-23.1");
}

#[sqlx::test(migrator = "sysupgrade_db::MIGRATOR")]
#[ignore]
async fn test_repeated_package_keeps_last_version(pool: PgPool) {
    let repo = PgCatalogRepo::new(pool);
    let packages = vec![
        ("kernel".to_string(), "1".to_string()),
        ("luci".to_string(), "git-23.1".to_string()),
        ("kernel".to_string(), "2".to_string()),
    ];
    repo.insert_packages(&coords(), &packages).await.unwrap();

    let available = repo.get_available_packages(&coords()).await.unwrap();
    assert_eq!(available.len(), 2);
    assert_eq!(available["kernel"], "2");
}

#[sqlx::test(migrator = "sysupgrade_db::MIGRATOR")]
#[ignore]
async fn test_large_package_index(pool: PgPool) {
    let repo = PgCatalogRepo::new(pool);
    let packages: Vec<(String, String)> = (0..12_000)
        .map(|i| (format!("pkg-{}", i), "1.0".to_string()))
        .collect();
    repo.insert_packages(&coords(), &packages).await.unwrap();

    let available = repo.get_available_packages(&coords()).await.unwrap();
    assert_eq!(available.len(), 12_000);
    assert_eq!(available["pkg-11999"], "1.0");
}

#[sqlx::test(migrator = "sysupgrade_db::MIGRATOR")]
#[ignore]
async fn test_large_subtarget_list(pool: PgPool) {
    let repo = PgCatalogRepo::new(pool);
    let subtargets: Vec<String> = (0..17_000).map(|i| format!("sub-{}", i)).collect();
    repo.insert_targets("openwrt", "23.05", "x86", &subtargets)
        .await
        .unwrap();

    let targets = repo.get_targets("openwrt", "23.05").await.unwrap();
    assert_eq!(targets.len(), 17_000);
}

#[sqlx::test(migrator = "sysupgrade_db::MIGRATOR")]
#[ignore]
async fn test_package_hash_is_idempotent(pool: PgPool) {
    let repo = PgCatalogRepo::new(pool.clone());
    repo.insert_package_hash("0123456789ab", &strings(&["kernel", "luci"]))
        .await
        .unwrap();
    repo.insert_package_hash("0123456789ab", &strings(&["other"]))
        .await
        .unwrap();

    let stored: String =
        sqlx::query_scalar("SELECT packages FROM packages_hashes WHERE hash = $1")
            .bind("0123456789ab")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored, "kernel luci");
}
