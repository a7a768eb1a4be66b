//! Demo and stress workloads.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tally_kv::MemoryDatabase;
use tally_layer::LayerClient;
use tally_layer::LayerError;
use tally_layer::RankedSet;
use tally_layer::ScoreRange;
use tally_layer::Subspace;
use tokio::task::JoinSet;
use tracing::info;
use tracing::warn;

use crate::args::StressArgs;

type Client = LayerClient<MemoryDatabase>;

pub async fn run_demo(client: &Client) -> Result<()> {
    let letters = client.open_ranked_set(Subspace::named(b"letters")).await?;
    let letters = &letters;
    client
        .run(move |tr| async move {
            for key in [b"a", b"b", b"c"] {
                letters.insert(&tr, key).await?;
            }
            Ok(())
        })
        .await?;

    let (size, rank_b, first, last) = client
        .run(move |tr| async move {
            Ok((
                letters.size(&tr).await?,
                letters.rank(&tr, b"b").await?,
                letters.key_at_rank(&tr, 0).await?,
                letters.key_at_rank(&tr, 2).await?,
            ))
        })
        .await?;
    println!("ranked set: size={size} rank(b)={rank_b} at(0)={} at(2)={}", first.escape_ascii(), last.escape_ascii());

    client.run(move |tr| async move { letters.remove(&tr, b"b").await }).await?;
    let (size, rank_c) = client
        .run(move |tr| async move { Ok((letters.size(&tr).await?, letters.rank(&tr, b"c").await?)) })
        .await?;
    println!("after remove(b): size={size} rank(c)={rank_c}");

    let board = client.open_scored_set(Subspace::named(b"leaderboard")).await?;
    let board = &board;
    client
        .run(move |tr| async move {
            for (player, score) in [(&b"x"[..], 5), (&b"y"[..], 1), (&b"z"[..], 5), (&b"w"[..], 12)] {
                board.insert(&tr, player, score).await?;
            }
            board.increment(&tr, b"y", 3).await?;
            Ok(())
        })
        .await?;

    let entries = client.run(move |tr| async move { board.range_by_score(&tr, 1, 5).await }).await?;
    for entry in &entries {
        println!("score {:>4}  {}", entry.score, entry.key.escape_ascii());
    }

    let range = ScoreRange::all().reversed(true).with_limit(2);
    let range = &range;
    let top = client.run(move |tr| async move { board.scan_by_score(&tr, range, None).await }).await?;
    let leaders: Vec<String> = top.entries.iter().map(|e| format!("{}={}", e.key.escape_ascii(), e.score)).collect();
    println!("top two: {}", leaders.join(", "));
    Ok(())
}

#[derive(Debug, Default)]
struct WorkerReport {
    inserts: u64,
    removes: u64,
    aborted: u64,
}

async fn run_worker(client: Client, set: Arc<RankedSet>, args: StressArgs, worker: u32) -> Result<WorkerReport> {
    let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(u64::from(worker)));
    let mut report = WorkerReport::default();

    for _ in 0..args.ops {
        let key = format!("key-{:06}", rng.random_range(0..args.key_space)).into_bytes();
        let set = set.as_ref();
        let key = &key;
        let outcome = client
            .run(move |tr| async move {
                if set.contains(&tr, key).await? {
                    set.remove(&tr, key).await?;
                    Ok(false)
                } else {
                    set.insert(&tr, key).await?;
                    Ok(true)
                }
            })
            .await;
        match outcome {
            Ok(true) => report.inserts += 1,
            Ok(false) => report.removes += 1,
            Err(LayerError::Aborted { attempts }) => {
                warn!(worker, attempts, "operation aborted");
                report.aborted += 1;
            }
            Err(err) => return Err(err).context("stress operation failed"),
        }
    }
    Ok(report)
}

pub async fn run_stress(client: &Client, args: &StressArgs) -> Result<()> {
    let set = Arc::new(client.open_ranked_set(Subspace::named(b"stress")).await?);
    info!(workers = args.workers, ops = args.ops, key_space = args.key_space, "starting stress run");

    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for worker in 0..args.workers {
        tasks.spawn(run_worker(client.clone(), Arc::clone(&set), args.clone(), worker));
    }

    let mut total = WorkerReport::default();
    while let Some(joined) = tasks.join_next().await {
        let report = joined.context("worker panicked")??;
        total.inserts += report.inserts;
        total.removes += report.removes;
        total.aborted += report.aborted;
    }
    let elapsed = started.elapsed();

    let set = set.as_ref();
    let (size, verified) = client
        .run(move |tr| async move { Ok((set.size(&tr).await?, set.verify(&tr).await?)) })
        .await?;
    let expected = total.inserts - total.removes;
    if size != expected || verified != expected {
        bail!("index mismatch: size={size} verified={verified} expected={expected}");
    }

    let stats = client.database().stats();
    println!(
        "{} ops in {:.2?}: inserts={} removes={} aborted={} size={} commits={} conflicts={}",
        total.inserts + total.removes + total.aborted,
        elapsed,
        total.inserts,
        total.removes,
        total.aborted,
        size,
        stats.commits,
        stats.conflicts,
    );
    Ok(())
}
