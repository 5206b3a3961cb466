//! heapdb workload driver
//!
//! Runs concurrent insert/scan/delete transactions against a table and checks
//! that exactly the committed rows survive.

use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use heapdb::access::{DbIterator, Field, Schema, Tuple, Type};
use heapdb::catalog::TableId;
use heapdb::config::BufferPoolConfig;
use heapdb::database::Database;
use heapdb::storage::StorageResult;
use log::{debug, info, warn};
use rand::Rng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const TABLE_NAME: &str = "accounts";

/// heapdb - page cache and lock manager workload driver
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long, default_value = "./heapdb_data")]
    data_dir: PathBuf,

    /// Buffer pool capacity in pages
    #[arg(short, long, default_value_t = heapdb::config::DEFAULT_CAPACITY)]
    pages: usize,

    /// Lock wait timeout in milliseconds
    #[arg(short, long, default_value_t = heapdb::config::DEFAULT_LOCK_TIMEOUT_MS)]
    lock_timeout_ms: u64,

    /// Number of worker threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Transactions per worker
    #[arg(short, long, default_value = "100")]
    rows: usize,

    /// Probability that a worker deliberately aborts a transaction
    #[arg(short, long, default_value = "0.1")]
    abort_rate: f64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Default)]
struct Stats {
    committed: AtomicUsize,
    aborted: AtomicUsize,
    retried: AtomicUsize,
    /// Net change in row count from committed transactions.
    delta: AtomicI64,
}

enum Outcome {
    Committed(i64),
    Aborted,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if !(0.0..=1.0).contains(&args.abort_rate) {
        bail!("--abort-rate must be between 0 and 1");
    }

    let config = BufferPoolConfig {
        capacity: args.pages,
        lock_timeout_ms: args.lock_timeout_ms,
    };
    let db = Database::open_or_create(&args.data_dir, &config)
        .with_context(|| format!("Failed to open database at {:?}", args.data_dir))?;

    let table_id = match db.catalog().table_id(TABLE_NAME) {
        Some(id) => id,
        None => db.create_table(
            TABLE_NAME,
            Schema::new(&[Type::Int, Type::String], &["id", "owner"])?,
        )?,
    };
    info!(
        "Data directory {:?}, table {} ({}), {} pages, {:?} lock timeout",
        db.dir(),
        TABLE_NAME,
        table_id,
        db.buffer_pool().capacity(),
        config.lock_timeout()
    );

    let initial = count_rows(&db, table_id)?;
    let db = Arc::new(db);
    let stats = Arc::new(Stats::default());
    let barrier = Arc::new(Barrier::new(args.threads));

    let handles: Vec<_> = (0..args.threads)
        .map(|worker| {
            let db = Arc::clone(&db);
            let stats = Arc::clone(&stats);
            let barrier = Arc::clone(&barrier);
            let rows = args.rows;
            let abort_rate = args.abort_rate;
            thread::spawn(move || -> Result<()> {
                barrier.wait();
                for i in 0..rows {
                    let key = (worker * rows + i) as i32;
                    run_with_retry(&db, table_id, key, abort_rate, &stats)?;
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => bail!("Worker thread panicked"),
        }
    }

    let final_count = count_rows(&db, table_id)?;
    let expected = initial as i64 + stats.delta.load(Ordering::SeqCst);

    println!(
        "committed: {}, aborted: {}, retried: {}",
        stats.committed.load(Ordering::SeqCst),
        stats.aborted.load(Ordering::SeqCst),
        stats.retried.load(Ordering::SeqCst)
    );
    println!(
        "rows before: {}, rows after: {}, expected: {}",
        initial, final_count, expected
    );

    if final_count as i64 != expected {
        bail!(
            "Row count mismatch: found {}, expected {}",
            final_count,
            expected
        );
    }
    Ok(())
}

fn run_with_retry(
    db: &Database,
    table_id: TableId,
    key: i32,
    abort_rate: f64,
    stats: &Stats,
) -> Result<()> {
    let mut rng = rand::thread_rng();
    loop {
        let deliberate_abort = rng.gen_bool(abort_rate);
        match run_transaction(db, table_id, key, deliberate_abort) {
            Ok(Outcome::Committed(delta)) => {
                stats.committed.fetch_add(1, Ordering::SeqCst);
                stats.delta.fetch_add(delta, Ordering::SeqCst);
                return Ok(());
            }
            Ok(Outcome::Aborted) => {
                stats.aborted.fetch_add(1, Ordering::SeqCst);
                return Ok(());
            }
            Err(e) if e.is_retryable() => {
                debug!("Retrying key {}: {}", key, e);
                stats.retried.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(rng.gen_range(1..20)));
            }
            Err(e) => {
                warn!("Giving up on key {}: {}", key, e);
                return Err(e.into());
            }
        }
    }
}

/// Inserts one row and, for every third key, deletes another row with the
/// same owner.
fn run_transaction(
    db: &Database,
    table_id: TableId,
    key: i32,
    deliberate_abort: bool,
) -> StorageResult<Outcome> {
    let txn = db.begin();
    let schema = db.catalog().schema(table_id)?;

    let mut tuple = Tuple::new(schema);
    tuple.set_field(0, Field::Int(key))?;
    tuple.set_field(1, Field::String(format!("owner-{}", key % 7)))?;
    txn.insert_tuple(table_id, &mut tuple)?;
    let mut delta = 1;

    if key % 3 == 0 {
        let mut scan = txn.scan(table_id)?;
        scan.open()?;
        while scan.has_next()? {
            let candidate = scan.next()?;
            if candidate.field(0) != Some(&Field::Int(key)) && candidate.field(1) == tuple.field(1) {
                txn.delete_tuple(&candidate)?;
                delta -= 1;
                break;
            }
        }
        scan.close();
    }

    if deliberate_abort {
        txn.abort()?;
        return Ok(Outcome::Aborted);
    }
    txn.commit()?;
    Ok(Outcome::Committed(delta))
}

fn count_rows(db: &Database, table_id: TableId) -> Result<usize> {
    let txn = db.begin();
    let mut scan = txn.scan(table_id)?;
    scan.open()?;
    let mut count = 0;
    while scan.has_next()? {
        scan.next()?;
        count += 1;
    }
    scan.close();
    drop(scan);
    txn.commit()?;
    Ok(count)
}
