// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Turn a Fritz!DECT smart switch off once the attached load is idle.
//!
//! Run with: `cargo run --example turn_off_when_idle -- <host> <ain>`
//!
//! Credentials are read from the `FRITZ_USER` and `FRITZ_PASSWORD`
//! environment variables.

use std::time::Duration;

use fritz_idle::{AhaSession, IdleMonitorBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "fritz.box".to_string());
    let ain = args
        .next()
        .ok_or("usage: turn_off_when_idle <host> <ain>")?;
    let user = std::env::var("FRITZ_USER")?;
    let password = std::env::var("FRITZ_PASSWORD")?;

    let plug = AhaSession::login(&host, &user, &password, &ain).await?;
    println!("logged in to {host}, watching AIN {ain}");

    let (monitor, mut state_rx) = IdleMonitorBuilder::new()
        .idle_threshold(5.0)
        .allowed_latency(1.0)
        .deadline(Duration::from_secs(3600))
        .build(plug)?;

    let reporter = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let s = state_rx.borrow().clone();
            println!(
                "{}  power: {:7.2} W  latency: {:5.2} s  offset: {:+.3} s",
                chrono::Local::now().format("%H:%M:%S"),
                s.watts,
                s.latency,
                s.offset,
            );
        }
    });

    monitor.run().await?;
    reporter.abort();
    println!("device reported idle with low latency, switch is now off");
    Ok(())
}
