//! The per-unit retry loop.
//!
//! A flat state machine over classified outcomes: nothing recoverable is
//! raised past this module. The only errors that escape are
//! process-fatal ones (empty fingerprint pool, unwritable output).

use std::time::{Duration, Instant};

use http::StatusCode;
use rand::Rng;
use tracing::{debug, warn};

use crate::classify::{classify_response, classify_transport, error_chain_text};
use crate::client::{rotating_headers, ClientBuildError};
use crate::context::EngineContext;
use crate::error::HarvestError;
use crate::ledger::{write_raw_dump, Category};
use crate::metrics_constants::{
    ATTEMPTS_TOTAL, ATTEMPT_DURATION, FINGERPRINTS_BLACKLISTED, OUTCOME_LABEL, RETRIES_TOTAL,
    UNITS_SKIPPED,
};
use crate::outcome::{Outcome, TransportCode};
use crate::profiles::TlsProfile;
use crate::queue::Unit;

/// Attempts 1 and 2 go proxyless; later ones rotate through the pool.
const PROXY_FROM_ATTEMPT: u32 = 3;
/// How long to withhold proxyless attempts after a proxyless rate limit.
const PROXYLESS_RECHECK: Duration = Duration::from_secs(60);

pub(crate) async fn process_unit(ctx: &EngineContext, unit: &Unit) -> Result<(), HarvestError> {
    // Secondary resume guard: enqueue-time subtraction already skipped
    // everything in the successful ledger, but two concurrent starters
    // may have raced the load.
    if ctx.ledgers.is_successful(&unit.id) {
        ctx.registry.record_skipped();
        metrics::counter!(UNITS_SKIPPED).increment(1);
        return Ok(());
    }

    let max_retries = ctx.config.max_retries;
    let mut attempt: u32 = 1;
    let mut blocked_this_unit = false;
    let mut last_label = "none";

    while attempt <= max_retries {
        inter_attempt_jitter(ctx).await;

        let profile = ctx.registry.pick_fingerprint()?;
        let proxy = select_proxy(ctx, attempt);
        let proxyless = proxy.is_none();

        let started = Instant::now();
        let outcome = attempt_fetch(ctx, unit, profile, proxy.as_deref()).await;
        last_label = outcome.label();

        ctx.registry.report_fingerprint(profile, &outcome);
        if let Some(url) = &proxy {
            ctx.registry.report_proxy(url, &outcome);
        }
        let labels = [(OUTCOME_LABEL, outcome.label().to_string())];
        metrics::counter!(ATTEMPTS_TOTAL, &labels).increment(1);
        metrics::histogram!(ATTEMPT_DURATION, &labels).record(started.elapsed().as_secs_f64());

        match outcome {
            Outcome::Success(payload) => {
                if proxyless {
                    ctx.registry.clear_proxyless_rate_limited();
                }
                deliver(ctx, unit, &payload).await;
                return Ok(());
            }
            Outcome::RateLimited { status } => {
                debug!(unit = %unit.id, attempt, status, "rate limited");
                if proxyless {
                    ctx.registry
                        .set_proxyless_rate_limited(Instant::now() + PROXYLESS_RECHECK);
                }
                let (lo, hi) = if status == StatusCode::FORBIDDEN.as_u16() {
                    ctx.config.block_backoff
                } else {
                    ctx.config.rate_limit_backoff
                };
                attempt += 1;
                if attempt <= max_retries {
                    ctx.registry.record_retry();
                    metrics::counter!(RETRIES_TOTAL).increment(1);
                    sleep_between(lo, hi).await;
                }
            }
            Outcome::Blocked => {
                debug!(unit = %unit.id, attempt, "anti-bot interstitial");
                blocked_this_unit = true;
                let (lo, hi) = ctx.config.block_backoff;
                attempt += 1;
                if attempt <= max_retries {
                    ctx.registry.record_retry();
                    metrics::counter!(RETRIES_TOTAL).increment(1);
                    sleep_between(lo, hi).await;
                }
            }
            Outcome::Timeout => {
                debug!(unit = %unit.id, attempt, "attempt timed out");
                attempt += 1;
                if attempt <= max_retries {
                    ctx.registry.record_retry();
                    metrics::counter!(RETRIES_TOTAL).increment(1);
                    transient_backoff(ctx, attempt).await;
                }
            }
            Outcome::TransportError { code } => {
                debug!(unit = %unit.id, attempt, code = code.as_curl_code(), "transport error");
                if let Some(bucket) = transport_bucket(code) {
                    ctx.ledgers.append(bucket, &unit.id)?;
                }
                attempt += 1;
                if attempt <= max_retries {
                    ctx.registry.record_retry();
                    metrics::counter!(RETRIES_TOTAL).increment(1);
                    transient_backoff(ctx, attempt).await;
                }
            }
            Outcome::FingerprintUnsupported => {
                // Retry-free: blacklist and go around again with a fresh
                // profile, without touching the attempt budget.
                ctx.registry.blacklist_fingerprint(profile)?;
                metrics::counter!(FINGERPRINTS_BLACKLISTED).increment(1);
            }
            Outcome::PermanentFailure { status, snippet } => {
                warn!(unit = %unit.id, status, "permanent failure");
                write_raw_dump(&ctx.paths.raw_dir(), &unit.id, &snippet)?;
                ctx.ledgers.append(Category::Failed, &unit.id)?;
                ctx.registry.record_failed_unit();
                return Ok(());
            }
        }
    }

    // Out of attempts without a terminal outcome.
    if blocked_this_unit {
        ctx.ledgers.append(Category::Blocked, &unit.id)?;
        ctx.ledgers.append(Category::Dropped, &unit.id)?;
        ctx.registry.record_blocked_unit();
    } else {
        write_raw_dump(
            &ctx.paths.raw_dir(),
            &unit.id,
            &format!("exhausted {max_retries} attempts; last outcome: {last_label}"),
        )?;
        ctx.ledgers.append(Category::Failed, &unit.id)?;
        ctx.registry.record_failed_unit();
    }
    Ok(())
}

/// One HTTP attempt, fully classified. Never errors: everything becomes
/// an [`Outcome`].
async fn attempt_fetch(
    ctx: &EngineContext,
    unit: &Unit,
    profile: TlsProfile,
    proxy: Option<&str>,
) -> Outcome {
    let client = match ctx.factory.build(profile, proxy) {
        Ok(client) => client,
        Err(ClientBuildError::UnsupportedProfile(_)) => return Outcome::FingerprintUnsupported,
        Err(err) => return classify_transport(&err.to_string(), false),
    };

    let headers = rotating_headers(ctx.config.origin.as_deref(), &mut rand::thread_rng());

    let response = match client.get(&unit.url).headers(headers).send().await {
        Ok(response) => response,
        Err(err) => return classify_transport(&error_chain_text(&err), err.is_timeout()),
    };

    let status = response.status();
    match response.bytes().await {
        Ok(body) => classify_response(status, &body),
        Err(err) => classify_transport(&error_chain_text(&err), err.is_timeout()),
    }
}

/// Persist a successful payload. Sink or mirror failures downgrade the
/// unit to the exception ledger; they never propagate.
async fn deliver(ctx: &EngineContext, unit: &Unit, payload: &[u8]) {
    if let Err(err) = try_deliver(ctx, unit, payload).await {
        warn!(unit = %unit.id, "failed to persist payload: {err}");
        write_raw_dump(&ctx.paths.raw_dir(), &unit.id, &err.to_string()).ok();
        ctx.ledgers.append(Category::Exception, &unit.id).ok();
        ctx.registry.record_exception_unit();
        return;
    }
    ctx.registry.record_success_unit();
}

async fn try_deliver(
    ctx: &EngineContext,
    unit: &Unit,
    payload: &[u8],
) -> Result<(), HarvestError> {
    ctx.sink.put(&unit.id, payload).await?;
    if let Some(dump) = &unit.dump_path {
        if let Some(parent) = dump.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dump, payload).await?;
    }
    ctx.ledgers.append(Category::Successful, &unit.id)?;
    Ok(())
}

fn select_proxy(ctx: &EngineContext, attempt: u32) -> Option<String> {
    if !ctx.config.use_proxies {
        return None;
    }
    let want_proxy = ctx.registry.proxyless_blocked(Instant::now())
        || attempt >= PROXY_FROM_ATTEMPT;
    if !want_proxy {
        return None;
    }
    // Falls back to proxyless when the pool has nothing valid left.
    ctx.registry.pick_proxy()
}

fn transport_bucket(code: TransportCode) -> Option<Category> {
    match code {
        TransportCode::CouldntConnect => Some(Category::Curl7),
        TransportCode::TlsHandshake => Some(Category::Curl35),
        TransportCode::ConnectionReset => Some(Category::Curl56),
        TransportCode::Other => None,
    }
}

async fn inter_attempt_jitter(ctx: &EngineContext) {
    let (min, max) = (ctx.config.min_delay, ctx.config.max_delay);
    if max.is_zero() {
        return;
    }
    let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

async fn sleep_between(lo: Duration, hi: Duration) {
    if hi.is_zero() {
        return;
    }
    let ms = rand::thread_rng().gen_range(lo.as_millis() as u64..=hi.as_millis() as u64);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

async fn transient_backoff(ctx: &EngineContext, next_attempt: u32) {
    match ctx.config.linear_backoff_step {
        Some(step) => tokio::time::sleep(step * next_attempt).await,
        None => {
            let (lo, hi) = ctx.config.block_backoff;
            sleep_between(lo, hi).await;
        }
    }
}
