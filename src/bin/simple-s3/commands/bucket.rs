// Bucket commands: mb, rb, lsb

use anyhow::{Context as _, Result};
use simple_s3::{BucketManager, Context};

use crate::cli::{BucketArgs, LsbArgs};

pub async fn execute_mb(args: &BucketArgs, buckets: &BucketManager, ctx: &Context) -> Result<()> {
    buckets
        .create_bucket(ctx, &args.bucket)
        .await
        .with_context(|| format!("Failed to create bucket: {}", args.bucket))?;
    println!("Created bucket: {}", args.bucket);
    Ok(())
}

pub async fn execute_rb(args: &BucketArgs, buckets: &BucketManager, ctx: &Context) -> Result<()> {
    let report = buckets
        .delete_bucket(ctx, &args.bucket)
        .await
        .with_context(|| format!("Failed to remove bucket: {}", args.bucket))?;

    if report.existed {
        println!(
            "Removed bucket: {} ({} objects in {} batches)",
            args.bucket, report.deleted_objects, report.batches
        );
    } else {
        println!("Bucket not found, nothing removed: {}", args.bucket);
    }
    Ok(())
}

pub async fn execute_lsb(args: &LsbArgs, buckets: &BucketManager, ctx: &Context) -> Result<()> {
    let names = buckets.list_buckets(ctx, args.prefix.as_deref()).await?;
    for name in &names {
        println!("{}", name);
    }
    Ok(())
}
