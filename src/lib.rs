/*!
# Example
Shows how to log in to a Fritz!Box and turn a smart switch off once the
device plugged into it has gone idle.

```rust,no_run
# async fn example() -> Result<(), fritz_idle::AhaError> {
use fritz_idle::{AhaSession, IdleMonitorBuilder};

let plug = AhaSession::login("fritz.box", "user", "secret", "11657 0272633").await?;
let (monitor, state_rx) = IdleMonitorBuilder::new()
    .idle_threshold(5.0)
    .build(plug)?;

// Runs until the switch is off; state_rx observes every poll.
monitor.run().await?;
let state = state_rx.borrow();
println!("done after {} polls, best latency {:.2}s", state.total_polls, state.min_latency);
# Ok(())
# }
```

The interesting part is not the switching but the timing: the switch
refreshes its power measurement roughly every 10 seconds on an internal
clock nobody can read, and the request channel is slow and jittery. The
monitor aligns its polling schedule with that hidden clock purely from the
latency of each response, so that the reading it finally acts on is known
to be current. See [`sync`] for the algorithm.
*/

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Custom error types for the monitor and the AHA-HTTP client.
pub mod error;

/// The capability interface the monitor consumes; implement it to drive
/// the monitor with something other than a Fritz!Box.
pub mod device;

/// Power records and the timing math derived from them.
pub mod record;

/// Poll-cycle synchronization state: latency bands, offset bisection and
/// the wake schedule.
pub mod sync;

/// The idle monitor: bootstrap, fast path, poll loop and the idle gate.
pub mod monitor;

/// AHA-HTTP client for Fritz!DECT smart switches (session login, switch
/// commands, power statistics).
pub mod aha;

mod md5;

pub use aha::AhaSession;
pub use device::SmartPlug;
pub use error::{AhaError, AuthError, ConfigError, ParseError, TimeoutError};
pub use monitor::{IdleMonitor, IdleMonitorBuilder, MonitorState};
pub use record::{PowerRecord, unix_now};
pub use sync::{Band, CycleTracker};
