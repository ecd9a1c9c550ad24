use chrono::{DateTime, Duration, Utc};
use govsearch_core::audit::RunKind;
use govsearch_core::error::{ErrorCode, GovsearchError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Filing lookback is expressed in quarters of this many days.
pub const DAYS_PER_QUARTER: i64 = 90;
pub const DEFAULT_BACKFILL_DAYS: u32 = 365;
pub const DEFAULT_BACKFILL_QUARTERS: u32 = 8;
pub const DEFAULT_INCREMENTAL_HOURS: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunMode {
    Backfill { days_back: u32, quarters_back: u32 },
    Incremental { hours_back: u32 },
}

impl RunMode {
    pub fn backfill(days_back: u32, quarters_back: u32) -> Self {
        RunMode::Backfill {
            days_back,
            quarters_back,
        }
    }

    pub fn incremental(hours_back: u32) -> Self {
        RunMode::Incremental { hours_back }
    }

    pub fn kind(&self) -> RunKind {
        match self {
            RunMode::Backfill { .. } => RunKind::Backfill,
            RunMode::Incremental { .. } => RunKind::Incremental,
        }
    }
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::incremental(DEFAULT_INCREMENTAL_HOURS)
    }
}

/// `[since, until)` for the fast sources plus the filings lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub lda_since: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("{0} must be greater than zero")]
    ZeroLookback(&'static str),
    #[error("{0} lookback is out of the representable time range")]
    OutOfRange(&'static str),
}

impl GovsearchError for WindowError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

pub fn compute_window(mode: RunMode) -> Result<RunWindow, WindowError> {
    compute_window_at(mode, Utc::now())
}

/// Pure window computation against an explicit "now".
pub fn compute_window_at(mode: RunMode, now: DateTime<Utc>) -> Result<RunWindow, WindowError> {
    match mode {
        RunMode::Backfill {
            days_back,
            quarters_back,
        } => {
            let since = subtract(now, days_back, Duration::try_days, "days_back")?;
            let lda_since = subtract(
                now,
                quarters_back,
                |quarters| Duration::try_days(quarters * DAYS_PER_QUARTER),
                "quarters_back",
            )?;
            Ok(RunWindow {
                since,
                until: now,
                lda_since,
            })
        }
        RunMode::Incremental { hours_back } => {
            let since = subtract(now, hours_back, Duration::try_hours, "hours_back")?;
            Ok(RunWindow {
                since,
                until: now,
                lda_since: since,
            })
        }
    }
}

fn subtract(
    now: DateTime<Utc>,
    amount: u32,
    unit: fn(i64) -> Option<Duration>,
    name: &'static str,
) -> Result<DateTime<Utc>, WindowError> {
    if amount == 0 {
        return Err(WindowError::ZeroLookback(name));
    }
    unit(i64::from(amount))
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or(WindowError::OutOfRange(name))
}
