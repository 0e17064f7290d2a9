use clap::Parser;
use noodles::bgzf;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tbxpool::{Config, Error, IndexedSource, SourceOptions, types::Region};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let source = Arc::new(
        IndexedSource::open_with(&config.path, SourceOptions::from(&config)).await?,
    );

    if !config.regions.is_empty() {
        let mut stdout = tokio::io::stdout();
        for region in &config.regions {
            let mut stream = source.query_region(region).await?;
            tokio::io::copy(&mut stream, &mut stdout).await?;
        }
        source.close();
        return Ok(());
    }

    let regions = record_regions(&source).await?;
    tracing::info!("Querying {} records from {:?}", regions.len(), config.path);

    for round in 0..config.rounds.max(1) {
        let t0 = Instant::now();
        let total = query_all(&source, &regions, config.concurrency.max(1)).await?;
        tracing::info!(
            round,
            records = total,
            seconds = t0.elapsed().as_secs_f64(),
            "round finished"
        );
    }

    source.close();
    Ok(())
}

/// One single-base region per record of the data file.
async fn record_regions(source: &IndexedSource) -> anyhow::Result<Vec<Region>> {
    let storage = source.storage();
    let file = File::open(storage.path()).await?;
    let mut reader = bgzf::r#async::Reader::new(file);
    let layout = storage.layout();

    let mut regions = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if layout.is_comment(&line) {
            continue;
        }

        let span = layout.span(&line)?;
        regions.push(Region::new(
            String::from_utf8_lossy(span.reference_name),
            span.start,
            span.start + 1,
        ));
    }

    Ok(regions)
}

/// Query every region with at most `concurrency` queries in flight and count
/// the records returned.
async fn query_all(
    source: &Arc<IndexedSource>,
    regions: &[Region],
    concurrency: usize,
) -> anyhow::Result<usize> {
    let mut tasks = JoinSet::new();
    let mut total = 0;

    for region in regions {
        while tasks.len() >= concurrency {
            if let Some(joined) = tasks.join_next().await {
                total += joined??;
            }
        }

        let source = Arc::clone(source);
        let region = region.clone();
        tasks.spawn(async move { count_records(&source, &region).await });
    }

    while let Some(joined) = tasks.join_next().await {
        total += joined??;
    }

    Ok(total)
}

async fn count_records(source: &IndexedSource, region: &Region) -> tbxpool::Result<usize> {
    let stream = source.query_region(region).await?;
    let mut lines = BufReader::new(stream).lines();

    let mut n = 0;
    while lines.next_line().await?.is_some() {
        n += 1;
    }

    if n == 0 {
        return Err(Error::Internal(format!("no records returned for {}", region)));
    }

    Ok(n)
}
