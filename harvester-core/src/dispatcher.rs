//! Fan-out of pending units across the bounded worker pool.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

use crate::context::EngineContext;
use crate::error::HarvestError;
use crate::ledger::Category;
use crate::metrics_constants::{TERMINAL_LABEL, UNITS_COMPLETED, WORKER_SATURATION};
use crate::progress;
use crate::queue::{Unit, WorkQueue};
use crate::registry::Stats;
use crate::worker;

/// Run the engine over the queue's pending set. Returns the final
/// counters; errors only on process-fatal conditions.
#[instrument(skip_all)]
pub async fn run_engine(
    ctx: Arc<EngineContext>,
    queue: WorkQueue,
) -> Result<Stats, HarvestError> {
    let units = queue.into_pending();
    info!(
        units = units.len(),
        workers = ctx.config.workers,
        "dispatching pending units"
    );

    let flusher = progress::spawn_flusher(
        ctx.registry.clone(),
        ctx.ledgers.clone(),
        ctx.paths.progress_path(),
    );

    let semaphore = Arc::new(Semaphore::new(ctx.config.workers));
    let mut tasks = JoinSet::new();
    let mut fatal: Option<HarvestError> = None;

    // Feed and drain interleaved: permits bound what is in flight, and
    // results are inspected as they land so a process-fatal error stops
    // dispatch instead of burning through the rest of the queue.
    let mut units = units.into_iter();
    let mut next_unit = units.next();
    while fatal.is_none() && next_unit.is_some() {
        tokio::select! {
            permit = semaphore.clone().acquire_owned() => {
                let permit = permit.expect("semaphore has been closed");
                metrics::gauge!(WORKER_SATURATION).set(
                    1f64 - semaphore.available_permits() as f64 / ctx.config.workers as f64,
                );

                if let Some(unit) = next_unit.take() {
                    tasks.spawn(spawn_unit(ctx.clone(), unit, permit));
                    next_unit = units.next();
                }
            }
            joined = tasks.join_next(), if !tasks.is_empty() => {
                if let Some(joined) = joined {
                    note_joined(joined, &mut fatal);
                }
            }
        }
    }

    // Queue exhausted or fatal error observed: drain what is in flight.
    while let Some(joined) = tasks.join_next().await {
        note_joined(joined, &mut fatal);
    }

    flusher.abort();
    progress::write_snapshot(&ctx.registry, &ctx.ledgers, &ctx.paths.progress_path())?;
    ctx.registry.persist()?;

    match fatal {
        Some(err) => Err(err),
        None => Ok(ctx.registry.stats()),
    }
}

async fn spawn_unit(
    ctx: Arc<EngineContext>,
    unit: Unit,
    permit: OwnedSemaphorePermit,
) -> Result<(), HarvestError> {
    let unit_id = unit.id.clone();
    let result = AssertUnwindSafe(worker::process_unit(&ctx, &unit))
        .catch_unwind()
        .await;
    drop(permit);

    // Completion is uniform: every dispatched unit counts toward the
    // total, whatever its outcome.
    ctx.registry.record_total();

    match result {
        Ok(Ok(())) => {
            let labels = [(TERMINAL_LABEL, "ok".to_string())];
            metrics::counter!(UNITS_COMPLETED, &labels).increment(1);
            Ok(())
        }
        Ok(Err(fatal)) => Err(fatal),
        Err(panic) => {
            // The exception ledger is the catch-all for anything the
            // retry loop did not absorb.
            let text = panic_text(panic);
            error!(unit = %unit_id, "worker panicked: {text}");
            crate::ledger::write_raw_dump(&ctx.paths.raw_dir(), &unit_id, &text).ok();
            ctx.ledgers.append(Category::Exception, &unit_id).ok();
            ctx.registry.record_exception_unit();
            Ok(())
        }
    }
}

fn note_joined(
    joined: Result<Result<(), HarvestError>, tokio::task::JoinError>,
    fatal: &mut Option<HarvestError>,
) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            if fatal.is_none() {
                error!("fatal engine error: {err}");
                *fatal = Some(err);
            }
        }
        Err(join_err) if join_err.is_cancelled() => {}
        Err(join_err) => error!("worker task join error: {join_err}"),
    }
}

fn panic_text(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    }
}
