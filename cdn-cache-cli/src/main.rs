use std::path::Path;
use std::time::{Duration, SystemTime};

use cdn_cache::cache::{SweepMode, parse_cache_dir, sweep_directory, url_cache_key};
use cdn_cache::{BodyOrigin, CdnCache, CdnCacheConfig};
use clap::Parser;
use futures::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use url::Url;

mod cli;
mod error;
mod utils;

use cli::{CliArgs, Command};
use error::AppError;
use utils::{parse_headers, parse_time};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    // Logs go to stderr so fetched bodies can be piped from stdout
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    let max_expire = parse_time(&args.max_expire)?;

    match &args.command {
        Command::Fetch {
            urls,
            output_dir,
            concurrency,
        } => {
            let cache = build_cache(&args, max_expire)?;
            match output_dir {
                None if urls.len() == 1 => fetch_to_stdout(&cache, &urls[0]).await,
                _ => {
                    let dir = output_dir.as_deref().unwrap_or(Path::new("."));
                    fetch_all(&cache, urls, dir, *concurrency).await
                }
            }
        }
        Command::Probe { urls } => {
            let cache = build_cache(&args, max_expire)?;
            probe_all(&cache, urls).await
        }
        Command::Gc { all } => collect_garbage(&args, max_expire, *all),
    }
}

fn build_cache(args: &CliArgs, max_expire: Duration) -> Result<CdnCache, AppError> {
    let mut builder = CdnCacheConfig::builder()
        .with_caching_enabled(!args.no_cache)
        .with_aggressive_mode(args.aggressive)
        .with_max_expire(max_expire)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_headers(&parse_headers(&args.headers));

    if let Some(dir) = &args.cache_dir {
        builder = builder.with_cache_dir(dir.as_str());
    } else if !args.no_cache {
        warn!("No --cache-dir given, responses will not be cached");
    }
    if let Some(user_agent) = &args.user_agent {
        builder = builder.with_user_agent(user_agent.as_str());
    }

    let config = builder.build();
    info!(
        enabled = config.enabled,
        aggressive = config.aggressive,
        max_expire = ?config.max_expire,
        "Cache configured"
    );
    Ok(CdnCache::new(config)?)
}

async fn fetch_to_stdout(cache: &CdnCache, url: &str) -> Result<(), AppError> {
    let mut body = cache.fetch(url).await?;
    let origin = body.origin();
    let mut stdout = tokio::io::stdout();
    let bytes = body.copy_to(&mut stdout).await?;
    info!(url, ?origin, bytes, "Fetched");
    Ok(())
}

async fn fetch_all(
    cache: &CdnCache,
    urls: &[String],
    dir: &Path,
    concurrency: usize,
) -> Result<(), AppError> {
    tokio::fs::create_dir_all(dir).await?;

    let results: Vec<bool> = futures::stream::iter(urls)
        .map(|url| async move {
            match fetch_to_dir(cache, url, dir).await {
                Ok((origin, bytes)) => {
                    info!(url = %url, ?origin, bytes, "Fetched");
                    true
                }
                Err(e) => {
                    error!(url = %url, error = %e, "Fetch failed");
                    false
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let failed = results.iter().filter(|ok| !**ok).count();
    if failed > 0 {
        return Err(AppError::Incomplete {
            failed,
            total: results.len(),
        });
    }
    Ok(())
}

async fn fetch_to_dir(
    cache: &CdnCache,
    url: &str,
    dir: &Path,
) -> Result<(BodyOrigin, u64), AppError> {
    let parsed = Url::parse(url)
        .map_err(|e| AppError::InvalidInput(format!("Invalid URL '{url}': {e}")))?;
    let path = dir.join(output_file_name(&parsed));

    let mut body = cache.fetch(url).await?;
    let origin = body.origin();
    let mut file = tokio::fs::File::create(&path).await?;
    let bytes = body.copy_to(&mut file).await?;
    Ok((origin, bytes))
}

/// Last path segment of `url`, or its cache key when the path has none
fn output_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| url_cache_key(url))
}

async fn probe_all(cache: &CdnCache, urls: &[String]) -> Result<(), AppError> {
    let mut failed = 0;
    for url in urls {
        match cache.probe_status(url).await {
            Ok(record) => println!("{}\t{}\t{}", record.status_code, record.file_size, record.url),
            Err(e) => {
                error!(url = %url, error = %e, "Probe failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(AppError::Incomplete {
            failed,
            total: urls.len(),
        });
    }
    Ok(())
}

fn collect_garbage(args: &CliArgs, max_expire: Duration, all: bool) -> Result<(), AppError> {
    let Some(raw) = &args.cache_dir else {
        return Err(AppError::InvalidInput(
            "gc requires --cache-dir".to_string(),
        ));
    };
    let (dir, _) = parse_cache_dir(raw);
    let mode = if all { SweepMode::All } else { SweepMode::Expired };

    let report = sweep_directory(&dir, max_expire, SystemTime::now(), mode)?;
    info!(
        dir = ?dir,
        scanned = report.scanned,
        removed = report.removed,
        failed = report.failed,
        "Garbage collection finished"
    );
    Ok(())
}
