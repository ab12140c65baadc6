//! Per-operation-class pacing of outbound backend calls
//!
//! The backend enforces quota per credential, so every remote call goes
//! through [`Throttler::wait`] first. Classes are a closed enum; retry
//! operation names may embed entity ids for logging, throttle classes never
//! do, which keeps the tracked-state map structurally bounded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::debug;
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;

/// Added to every computed wait so we land past the interval, not on it
const WAIT_BUFFER: Duration = Duration::from_millis(100);

/// Shortest sleep a throttled caller ever takes
const MIN_SLEEP: Duration = Duration::from_millis(100);

/// Symmetric jitter applied to computed waits (fraction of the wait)
const JITTER_FRACTION: f64 = 0.1;

/// Tracked classes beyond this trigger housekeeping
const HOUSEKEEPING_LIMIT: usize = 16;

/// Classes retained when housekeeping runs
const HOUSEKEEPING_RETAIN: usize = 8;

/// Categories of outbound backend calls with distinct pacing needs.
///
/// Writes get a stricter interval than reads; file-storage calls are the
/// most expensive on the far side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// Spreadsheet metadata and setup calls
    Sheets,
    /// Row reads from the order sheet
    SheetsRead,
    /// Appends and cell updates
    SheetsWrite,
    /// Inventory snapshot fetches
    Inventory,
    /// File-storage uploads
    Drive,
}

impl OperationClass {
    /// All operation classes.
    pub const ALL: [OperationClass; 5] = [
        OperationClass::Sheets,
        OperationClass::SheetsRead,
        OperationClass::SheetsWrite,
        OperationClass::Inventory,
        OperationClass::Drive,
    ];

    /// Stable name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            OperationClass::Sheets => "sheets",
            OperationClass::SheetsRead => "sheets_read",
            OperationClass::SheetsWrite => "sheets_write",
            OperationClass::Inventory => "inventory",
            OperationClass::Drive => "drive",
        }
    }
}

/// Static per-class minimum spacing between calls
#[derive(Debug, Clone)]
pub struct ThrottleIntervals {
    pub sheets: Duration,
    pub sheets_read: Duration,
    pub sheets_write: Duration,
    pub inventory: Duration,
    pub drive: Duration,
}

impl Default for ThrottleIntervals {
    fn default() -> Self {
        Self {
            sheets: Duration::from_millis(1000),
            sheets_read: Duration::from_millis(500),
            sheets_write: Duration::from_millis(1200),
            inventory: Duration::from_millis(800),
            drive: Duration::from_millis(1500),
        }
    }
}

impl ThrottleIntervals {
    fn for_class(&self, class: OperationClass) -> Duration {
        match class {
            OperationClass::Sheets => self.sheets,
            OperationClass::SheetsRead => self.sheets_read,
            OperationClass::SheetsWrite => self.sheets_write,
            OperationClass::Inventory => self.inventory,
            OperationClass::Drive => self.drive,
        }
    }
}

type Slot = Arc<AsyncMutex<Option<Instant>>>;

/// Minimum-interval gate serializing same-class callers.
///
/// Each class owns an async mutex held across the pacing sleep, so
/// concurrent same-class callers queue and each is paced against the
/// previous caller's recorded timestamp. Different classes never wait on
/// each other.
pub struct Throttler {
    intervals: ThrottleIntervals,
    slots: StdMutex<HashMap<OperationClass, Slot>>,
}

fn lock_slots(
    slots: &StdMutex<HashMap<OperationClass, Slot>>,
) -> MutexGuard<'_, HashMap<OperationClass, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Throttler {
    pub fn new(intervals: ThrottleIntervals) -> Self {
        Self {
            intervals,
            slots: StdMutex::new(HashMap::new()),
        }
    }

    /// Suspend until at least the class interval has elapsed since the last
    /// call of that class, then record the new timestamp.
    ///
    /// A first call for a class returns immediately. Waits carry symmetric
    /// ±10 % jitter with a 100 ms floor so concurrent sessions don't wake in
    /// lockstep against the shared backend.
    pub async fn wait(&self, class: OperationClass) {
        let slot = {
            let mut slots = lock_slots(&self.slots);
            slots
                .entry(class)
                .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
                .clone()
        };

        let mut last = slot.lock().await;

        if let Some(previous) = *last {
            let min_wait = self.intervals.for_class(class);
            let elapsed = previous.elapsed();
            if elapsed < min_wait {
                let wait = (min_wait - elapsed + WAIT_BUFFER).as_secs_f64();
                let jitter = rand::thread_rng()
                    .gen_range(-JITTER_FRACTION..=JITTER_FRACTION)
                    * wait;
                let adjusted = (wait + jitter).max(MIN_SLEEP.as_secs_f64());
                debug!(
                    "Throttling '{}' for {:.2} seconds",
                    class.name(),
                    adjusted
                );
                tokio::time::sleep(Duration::from_secs_f64(adjusted)).await;
            }
        }

        *last = Some(Instant::now());
        drop(last);

        self.housekeep();
    }

    /// Bounded-map safety net: the closed enum already caps the slot map, but
    /// if it ever grows past the threshold, keep only the most recently used
    /// classes.
    fn housekeep(&self) {
        let mut slots = lock_slots(&self.slots);
        if slots.len() <= HOUSEKEEPING_LIMIT {
            return;
        }

        let mut stamped: Vec<(OperationClass, Instant)> = slots
            .iter()
            .filter_map(|(class, slot)| {
                let guard = slot.try_lock().ok()?;
                (*guard).map(|at| (*class, at))
            })
            .collect();
        stamped.sort_by_key(|(_, at)| *at);

        let excess = stamped.len().saturating_sub(HOUSEKEEPING_RETAIN);
        for (class, _) in stamped.into_iter().take(excess) {
            slots.remove(&class);
        }
    }
}
