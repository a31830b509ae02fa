// Object commands: ls, put, get, rm

use anyhow::{Context as _, Result};
use simple_s3::{Context, ObjectCoordinator};
use tokio::io::AsyncWriteExt;

use super::format_bytes;
use crate::cli::{GetArgs, LsArgs, ObjectArgs, PutArgs};

pub async fn execute_ls(args: &LsArgs, objects: &ObjectCoordinator, ctx: &Context) -> Result<()> {
    let keys = objects
        .list_objects(ctx, &args.bucket, args.prefix.as_deref())
        .await?;
    for key in &keys {
        println!("{}", key);
    }
    Ok(())
}

pub async fn execute_put(args: &PutArgs, objects: &ObjectCoordinator, ctx: &Context) -> Result<()> {
    let mut file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("Failed to open file: {}", args.file.display()))?;

    let outcome = objects
        .put_object(ctx, &args.bucket, &args.key, &mut file)
        .await
        .with_context(|| format!("Failed to upload {} to s3://{}/{}", args.file.display(), args.bucket, args.key))?;

    println!(
        "Uploaded: s3://{}/{} ({}, {}, {})",
        args.bucket,
        args.key,
        format_bytes(outcome.size),
        outcome.content_type,
        outcome.strategy
    );
    Ok(())
}

pub async fn execute_get(args: &GetArgs, objects: &ObjectCoordinator, ctx: &Context) -> Result<()> {
    let data = objects
        .fetch_object(ctx, &args.bucket, &args.key)
        .await
        .with_context(|| format!("Failed to download s3://{}/{}", args.bucket, args.key))?;

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &data)
                .await
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
            eprintln!("Downloaded: {} ({})", path.display(), format_bytes(data.len() as u64));
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

pub async fn execute_rm(args: &ObjectArgs, objects: &ObjectCoordinator, ctx: &Context) -> Result<()> {
    objects
        .delete_object(ctx, &args.bucket, &args.key)
        .await
        .with_context(|| format!("Failed to remove s3://{}/{}", args.bucket, args.key))?;
    println!("Deleted: s3://{}/{}", args.bucket, args.key);
    Ok(())
}
