//! Demo driver for the breakwater resilience core.
//!
//! Simulates a run of inbound requests against a flaky downstream: each
//! request goes through the retry orchestrator and the shared circuit
//! breaker, and every outcome and state change is tallied the way a metrics
//! backend would count them. The summary at the end shows the breaker
//! tripping, cooling off, probing, and closing again.

use anyhow::Result;
use clap::Parser;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use breakwater_core::{
    BackoffPolicy, BreakerConfig, CircuitBreaker, Outcome, OutcomeRecorder, Retrier,
};

#[derive(Debug, Parser)]
#[command(name = "breakwater", about = "Exercise a circuit breaker against a flaky downstream")]
struct Args {
    /// Inbound requests to simulate
    #[arg(long, default_value_t = 20)]
    requests: u32,

    /// Downstream calls that fail before it recovers
    #[arg(long, default_value_t = 8)]
    fail_first: u32,

    /// Attempts per inbound request
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Consecutive failures tolerated before the circuit opens
    #[arg(long, default_value_t = 3)]
    trip_after: u32,

    /// How long the circuit stays open before probing
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    open_timeout: Duration,

    /// Probes admitted while half-open (0 = unlimited)
    #[arg(long, default_value_t = 5)]
    max_half_open_requests: u32,

    /// Smallest backoff delay
    #[arg(long, default_value = "100ms", value_parser = humantime::parse_duration)]
    min_delay: Duration,

    /// Largest backoff delay
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    max_delay: Duration,
}

#[derive(Debug, Error)]
enum DownstreamError {
    #[error("downstream unavailable")]
    Unavailable,
}

/// Stand-in for the external API: fails a fixed number of calls, then heals.
struct FlakyDownstream {
    failures_left: AtomicU32,
}

impl FlakyDownstream {
    fn new(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
        }
    }

    fn call(&self) -> Result<u16, DownstreamError> {
        let healed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_err();
        if healed {
            Ok(200)
        } else {
            Err(DownstreamError::Unavailable)
        }
    }
}

/// Labelled counters, the shape a Prometheus-style sink would keep.
#[derive(Default)]
struct Tally {
    counts: Mutex<BTreeMap<String, u64>>,
}

impl Tally {
    fn bump(&self, label: &str) {
        *self.counts.lock().entry(label.to_string()).or_default() += 1;
    }

    fn report(&self) {
        println!("\n=== event tally ===");
        for (label, count) in self.counts.lock().iter() {
            println!("{label:>24}  {count}");
        }
    }
}

impl OutcomeRecorder for Tally {
    fn record(&self, outcome: Outcome) {
        self.bump(&format!("attempt/{outcome}"));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let tally = Arc::new(Tally::default());
    let trip_after = args.trip_after;

    let config = BreakerConfig {
        name: "demo-api".to_string(),
        max_half_open_requests: args.max_half_open_requests,
        closed_reset_interval: Duration::from_secs(60),
        open_timeout: args.open_timeout,
    };

    let breaker = {
        let tally = Arc::clone(&tally);
        CircuitBreaker::builder(config)
            .ready_to_trip(move |counts| counts.consecutive_failures > trip_after)
            .on_state_change(move |_name, _from, to| tally.bump(&format!("state/{to}")))
            .build()
    };

    let recorder: Arc<dyn OutcomeRecorder> = Arc::clone(&tally) as Arc<dyn OutcomeRecorder>;
    let retrier = Retrier::new(args.max_attempts)
        .with_backoff(BackoffPolicy::new(args.min_delay, args.max_delay))
        .with_recorder(recorder);

    let downstream = Arc::new(FlakyDownstream::new(args.fail_first));

    let mut served = 0u32;
    let mut unavailable = 0u32;

    for request in 1..=args.requests {
        let target = Arc::clone(&downstream);
        let result = retrier
            .run(&breaker, move || {
                let target = Arc::clone(&target);
                async move { target.call() }
            })
            .await;

        match result {
            Ok(status) => {
                served += 1;
                tracing::info!(request, status, "request succeeded");
            }
            Err(err) => {
                unavailable += 1;
                // The transport layer would answer 503 here
                tracing::warn!(request, error = %err, "request failed, service unavailable");
            }
        }
    }

    println!("\nserved {served}/{} requests ({unavailable} unavailable)", args.requests);
    tally.report();

    Ok(())
}
