//! Queue commands.

use anyhow::Result;
use serde_json::json;
use sysupgrade_core::{BuildRequest, Fingerprint, JobStatus};
use sysupgrade_scheduler::BuildQueue;

use super::{Context, print_json};

pub async fn submit(ctx: &Context, request: &BuildRequest) -> Result<()> {
    let queue = ctx.queue()?;
    let (_, fingerprint) = queue.fingerprint(request)?;
    let enqueued = queue.enqueue(request).await?;
    print_json(&json!({
        "id": enqueued.id,
        "fingerprint": fingerprint,
        "status": enqueued.status,
        "outcome": enqueued.outcome(),
    }))
}

pub async fn claim(ctx: &Context) -> Result<()> {
    match ctx.queue()?.claim_next().await? {
        Some(job) => print_json(&job),
        None => {
            println!("No pending jobs");
            Ok(())
        }
    }
}

pub async fn fail(ctx: &Context, hash: &str) -> Result<()> {
    let fingerprint: Fingerprint = hash.parse()?;
    let job = ctx.queue()?.mark_failed(&fingerprint).await?;
    print_json(&job)
}

pub async fn delete(ctx: &Context, hash: &str) -> Result<()> {
    let fingerprint: Fingerprint = hash.parse()?;
    if ctx.queue()?.delete(&fingerprint).await? {
        println!("Deleted job {}", fingerprint);
    } else {
        println!("No job {}", fingerprint);
    }
    Ok(())
}

pub async fn show(ctx: &Context, hash: &str) -> Result<()> {
    let fingerprint: Fingerprint = hash.parse()?;
    match ctx.queue()?.get(&fingerprint).await? {
        Some(job) => print_json(&job),
        None => anyhow::bail!("No job {}", fingerprint),
    }
}

pub async fn list(ctx: &Context, status: &str, limit: u32) -> Result<()> {
    let status: JobStatus = status.parse()?;
    let jobs = ctx.queue()?.list(status, i64::from(limit)).await?;
    print_json(&jobs)
}

pub async fn stats(ctx: &Context) -> Result<()> {
    let queue = ctx.queue()?;
    let mut counts = Vec::new();
    for status in JobStatus::ALL {
        let count = queue.count(status).await?;
        counts.push(json!({ "status": status, "count": count }));
    }
    print_json(&counts)
}
