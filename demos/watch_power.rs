// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Poll a smart switch's power readings once per cycle and print them,
//! without switching anything.
//!
//! Run with: `cargo run --example watch_power -- <host> <ain>`

use std::time::Duration;

use fritz_idle::{AhaSession, SmartPlug};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "fritz.box".to_string());
    let ain = args.next().ok_or("usage: watch_power <host> <ain>")?;
    let user = std::env::var("FRITZ_USER")?;
    let password = std::env::var("FRITZ_PASSWORD")?;

    let plug = AhaSession::login(&host, &user, &password, &ain).await?;

    loop {
        let record = plug.latest_power_record().await?;
        println!(
            "{}  power: {:7.2} W  sampled: {}  latency: {:5.2} s  round trip: {:.2} s",
            chrono::Local::now().format("%H:%M:%S"),
            record.watts,
            chrono::DateTime::from_timestamp(record.sample_time as i64, 0)
                .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "?".to_string()),
            record.latency(),
            record.duration(),
        );
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
}
