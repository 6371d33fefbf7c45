//! Hydrates a large list of raw quotes into display records through
//! idle-time batches, superseding a stale run along the way.
//!
//! Run with `RUST_LOG=trace` to watch individual batch grants.

use anyhow::Result;
use idlemap_core::{lazy_map, lazy_map_with, BatchPolicy, RunPhase};
use idlemap_runtime_std::{HostConfig, StdIdleHost};

#[derive(Clone, Debug)]
struct RawQuote {
    id: u64,
    base: u64,
    quote: u64,
}

#[derive(Debug)]
struct PricedQuote {
    id: u64,
    mid: f64,
    weight: f64,
}

fn synthetic_quotes(count: u64) -> Vec<RawQuote> {
    (0..count)
        .map(|id| RawQuote {
            id,
            base: 1_000 + id * 7,
            quote: 500 + id * 3,
        })
        .collect()
}

fn hydrate(raw: &RawQuote, index: usize, all: &[RawQuote]) -> PricedQuote {
    PricedQuote {
        id: raw.id,
        mid: raw.quote as f64 / raw.base as f64,
        weight: (index + 1) as f64 / all.len() as f64,
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let host = StdIdleHost::with_config(HostConfig::default())?;
    let handle = host.handle();

    // A first run that is immediately superseded: only the newest input
    // for a key pays for hydration.
    let stale = lazy_map(&handle, "hydrate", synthetic_quotes(100), hydrate);
    let fresh = lazy_map_with(
        &handle,
        "hydrate",
        synthetic_quotes(5_000),
        BatchPolicy::new(64),
        hydrate,
    );

    let priced = host.block_on(fresh);
    log::info!("hydrated {} quotes", priced.len());

    let superseded = handle
        .run_records("hydrate")
        .iter()
        .filter(|record| record.phase == RunPhase::Superseded)
        .count();
    log::info!("superseded runs for 'hydrate': {superseded}");
    assert!(!stale.is_resolved());

    let last = priced.last().expect("non-empty input");
    println!(
        "hydrated {} quotes; last: id={} mid={:.4} weight={:.2}",
        priced.len(),
        last.id,
        last.mid,
        last.weight
    );
    Ok(())
}
