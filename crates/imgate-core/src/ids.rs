//! Identifier generators: the server message id snowflake, chat id
//! derivation, and the UUID <-> 16-byte wire representation.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Epoch the server message id timestamp bits are measured from:
/// 2024-01-01T00:00:00Z, in milliseconds since the Unix epoch.
const CUSTOM_EPOCH_MS: u64 = 1_704_067_200_000;

const TIMESTAMP_BITS: u32 = 41;
const DATACENTER_BITS: u32 = 5;
const MACHINE_BITS: u32 = 5;
const SEQUENCE_BITS: u32 = 12;

const MAX_DATACENTER_ID: u16 = (1 << DATACENTER_BITS) - 1;
const MAX_MACHINE_ID: u16 = (1 << MACHINE_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

const MACHINE_SHIFT: u32 = SEQUENCE_BITS;
const DATACENTER_SHIFT: u32 = SEQUENCE_BITS + MACHINE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + MACHINE_BITS + DATACENTER_BITS;

/// Upper bound, in milliseconds, on how long the generator will spin-wait
/// for a clock regression to self-correct before giving up.
const MAX_CLOCK_REGRESSION_SPIN_MS: u64 = 5_000;

struct GeneratorState {
    last_timestamp_ms: u64,
    sequence: u16,
}

/// A 64-bit monotonic id generator: `[sign=0 | 41-bit ms since 2024-01-01
/// UTC | 5-bit datacenter | 5-bit machine | 12-bit sequence]`.
///
/// One instance is meant to be constructed once at boot and shared (it is
/// internally synchronized); see [`Snowflake::global`] for the blessed
/// singleton pattern used by the rest of the gateway.
pub struct Snowflake {
    datacenter_id: u16,
    machine_id: u16,
    state: Mutex<GeneratorState>,
}

impl Snowflake {
    /// Construct a generator for the given datacenter/machine pair.
    ///
    /// # Errors
    ///
    /// Returns an error if either id exceeds its bit width (5 bits, 0..=31).
    pub fn new(datacenter_id: u16, machine_id: u16) -> CoreResult<Self> {
        if datacenter_id > MAX_DATACENTER_ID {
            return Err(CoreError::Validation(format!(
                "datacenter_id {datacenter_id} exceeds max {MAX_DATACENTER_ID}"
            )));
        }
        if machine_id > MAX_MACHINE_ID {
            return Err(CoreError::Validation(format!(
                "machine_id {machine_id} exceeds max {MAX_MACHINE_ID}"
            )));
        }
        Ok(Self {
            datacenter_id,
            machine_id,
            state: Mutex::new(GeneratorState {
                last_timestamp_ms: 0,
                sequence: 0,
            }),
        })
    }

    /// Generate the next id.
    ///
    /// Clock regressions spin-wait (bounded by
    /// [`MAX_CLOCK_REGRESSION_SPIN_MS`]) for the clock to catch back up.
    /// Sequence exhaustion within a single millisecond spins to the next
    /// millisecond.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ClockRegression`] if the spin-wait bound is
    /// exceeded.
    pub fn next_id(&self) -> CoreResult<u64> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = now_ms();

        if now < state.last_timestamp_ms {
            let regressed_by = state.last_timestamp_ms - now;
            if regressed_by > MAX_CLOCK_REGRESSION_SPIN_MS {
                return Err(CoreError::ClockRegression(regressed_by));
            }
            while now < state.last_timestamp_ms {
                std::thread::yield_now();
                now = now_ms();
            }
        }

        if now == state.last_timestamp_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted this millisecond: spin to the next one.
                while now <= state.last_timestamp_ms {
                    std::thread::yield_now();
                    now = now_ms();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp_ms = now;

        let elapsed = now.saturating_sub(CUSTOM_EPOCH_MS);
        debug_assert!(elapsed < (1u64 << TIMESTAMP_BITS));

        let id = (elapsed << TIMESTAMP_SHIFT)
            | (u64::from(self.datacenter_id) << DATACENTER_SHIFT)
            | (u64::from(self.machine_id) << MACHINE_SHIFT)
            | u64::from(state.sequence);
        Ok(id)
    }

    /// Decompose an id back into its timestamp (ms since Unix epoch),
    /// datacenter id, machine id, and sequence.
    #[must_use]
    pub fn parse(id: u64) -> ParsedId {
        let sequence = (id & u64::from(MAX_SEQUENCE)) as u16;
        let machine_id = ((id >> MACHINE_SHIFT) & u64::from(MAX_MACHINE_ID)) as u16;
        let datacenter_id = ((id >> DATACENTER_SHIFT) & u64::from(MAX_DATACENTER_ID)) as u16;
        let elapsed = id >> TIMESTAMP_SHIFT;
        ParsedId {
            timestamp_ms: CUSTOM_EPOCH_MS.saturating_add(elapsed),
            datacenter_id,
            machine_id,
            sequence,
        }
    }
}

/// The fields recovered by [`Snowflake::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedId {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Datacenter id (5 bits).
    pub datacenter_id: u16,
    /// Machine id (5 bits).
    pub machine_id: u16,
    /// Sequence within the millisecond (12 bits).
    pub sequence: u16,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

static GLOBAL: std::sync::OnceLock<Snowflake> = std::sync::OnceLock::new();

impl Snowflake {
    /// Initialize the process-wide generator singleton. Must be called
    /// exactly once at boot, with the blessed `(datacenter_id, machine_id)`
    /// for this node; subsequent calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if the ids are out of range.
    pub fn init_global(datacenter_id: u16, machine_id: u16) -> CoreResult<()> {
        let generator = Self::new(datacenter_id, machine_id)?;
        let _ = GLOBAL.set(generator);
        Ok(())
    }

    /// Access the process-wide generator singleton.
    ///
    /// # Panics
    ///
    /// Panics if [`Snowflake::init_global`] has not yet been called.
    #[must_use]
    pub fn global() -> &'static Snowflake {
        GLOBAL
            .get()
            .expect("Snowflake::init_global must run before Snowflake::global")
    }
}

const CHAT_BIZ: u32 = 100;

/// Derive the deterministic, symmetric chat id for a pair of user ids:
/// `"{biz}-1-{min(a,b)}-{max(a,b)}"`. Ordering is numeric when both ids
/// parse as integers, lexicographic otherwise.
#[must_use]
pub fn chat_id(a: &str, b: &str) -> String {
    let (lo, hi) = match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(na), Ok(nb)) => {
            if na <= nb {
                (a, b)
            } else {
                (b, a)
            }
        }
        _ => {
            if a <= b {
                (a, b)
            } else {
                (b, a)
            }
        }
    };
    format!("{CHAT_BIZ}-1-{lo}-{hi}")
}

/// Split a UUID into its big-endian 8+8 byte representation.
#[must_use]
pub fn uuid_to_bytes(u: Uuid) -> Vec<u8> {
    u.as_bytes().to_vec()
}

/// Recover a UUID from its 16-byte big-endian representation. Inputs that
/// are not exactly 16 bytes are tolerated: the raw bytes are treated as an
/// opaque string and hashed into a UUID via the v5 namespace-less fallback
/// so the operation never fails, matching the "tolerant of non-16-byte
/// inputs" requirement.
#[must_use]
pub fn bytes_to_uuid(bytes: &[u8]) -> Uuid {
    match <[u8; 16]>::try_from(bytes) {
        Ok(arr) => Uuid::from_bytes(arr),
        Err(_) => Uuid::new_v5(&Uuid::NAMESPACE_OID, bytes),
    }
}
