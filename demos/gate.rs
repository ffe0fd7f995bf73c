//! # Example: gate
//!
//! Uses an [`AdmissionGate`] on its own to cap concurrent calls to a slow
//! resource. Requests that cannot get in within 50ms are rejected as busy.
//!
//! ## Run
//! ```bash
//! cargo run --example gate
//! ```

use std::time::Duration;

use stagevisor::{AdmissionGate, CancellationSignal, GateError};
use tokio::task::JoinSet;

async fn slow_call(id: u32) -> u32 {
    tokio::time::sleep(Duration::from_millis(40)).await;
    id * 10
}

#[tokio::main]
async fn main() {
    let gate = AdmissionGate::new(3);
    let signal = CancellationSignal::new();

    let mut set = JoinSet::new();
    for id in 0..12 {
        let gate = gate.clone();
        let signal = signal.clone();
        set.spawn(async move {
            let res = gate
                .run(&signal, Some(Duration::from_millis(50)), slow_call(id))
                .await;
            (id, res)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((id, Ok(value))) => println!("request {id:>2} → {value}"),
            Ok((id, Err(GateError::Busy { waited }))) => {
                println!("request {id:>2} → busy after {waited:?}")
            }
            Ok((id, Err(err))) => println!("request {id:>2} → {err}"),
            Err(err) => eprintln!("task failed: {err}"),
        }
    }
    println!(
        "peak in use: {} (limit {}), now in use: {}",
        gate.peak_in_use(),
        gate.limit(),
        gate.in_use()
    );
}
