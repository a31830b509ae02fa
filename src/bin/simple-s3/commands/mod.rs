mod bucket;
mod object;

use anyhow::Result;
use simple_s3::{Context, SimpleS3};

use crate::cli::Commands;

pub async fn execute(command: &Commands, client: &SimpleS3, ctx: &Context) -> Result<()> {
    match command {
        Commands::Mb(args) => bucket::execute_mb(args, client.buckets(), ctx).await,
        Commands::Rb(args) => bucket::execute_rb(args, client.buckets(), ctx).await,
        Commands::Lsb(args) => bucket::execute_lsb(args, client.buckets(), ctx).await,
        Commands::Ls(args) => object::execute_ls(args, client.objects(), ctx).await,
        Commands::Put(args) => object::execute_put(args, client.objects(), ctx).await,
        Commands::Get(args) => object::execute_get(args, client.objects(), ctx).await,
        Commands::Rm(args) => object::execute_rm(args, client.objects(), ctx).await,
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
