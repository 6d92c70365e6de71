//! Scan controller.
//!
//! A scan re-issues queries over progressively earlier time windows until the
//! caller finds data. The controller only holds the state
//! (`Idle -> Scanning -> Idle`); every step is triggered from outside.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::RawTimeRange;
use crate::time::DateMathError;
use crate::transaction::TransactionStore;

/// Produces the next, earlier range of a scan.
pub trait RangeScanner: Send + Sync {
    /// Returns the range to query after `current`.
    ///
    /// # Errors
    ///
    /// Returns an error if `current` cannot be resolved.
    fn next_range(
        &self,
        current: &RawTimeRange,
        now: DateTime<Utc>,
    ) -> Result<RawTimeRange, DateMathError>;
}

impl std::fmt::Debug for dyn RangeScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RangeScanner")
    }
}

/// Moves the window back by its own span.
///
/// `now-1h..now` becomes the absolute hour before it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviousRangeScanner;

impl RangeScanner for PreviousRangeScanner {
    fn next_range(
        &self,
        current: &RawTimeRange,
        now: DateTime<Utc>,
    ) -> Result<RawTimeRange, DateMathError> {
        let resolved = current.resolve(now)?;
        let span = resolved.to - resolved.from;
        let from = resolved
            .from
            .checked_sub_signed(span)
            .ok_or_else(|| DateMathError::OutOfRange(current.from.clone()))?;
        Ok(RawTimeRange::absolute(from, resolved.from))
    }
}

/// Scan state of one explore pane.
#[derive(Clone, Default)]
pub struct ScanController {
    scanner: Option<Arc<dyn RangeScanner>>,
    scan_range: Option<RawTimeRange>,
}

impl std::fmt::Debug for ScanController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanController")
            .field("scanning", &self.is_scanning())
            .field("scan_range", &self.scan_range)
            .finish()
    }
}

impl ScanController {
    /// Creates an idle controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters `Scanning` with the given range producer.
    pub fn start_scanning(&mut self, scanner: Arc<dyn RangeScanner>) {
        self.scanner = Some(scanner);
        self.scan_range = None;
        tracing::debug!("Scan started");
    }

    /// Returns true while a scan is in progress.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_some()
    }

    /// Returns the range of the latest scan step.
    #[must_use]
    pub fn scan_range(&self) -> Option<&RawTimeRange> {
        self.scan_range.as_ref()
    }

    /// Records the range of a scan step.
    pub fn set_scan_range(&mut self, range: RawTimeRange) {
        self.scan_range = Some(range);
    }

    /// Asks the scanner for the range before `current` and records it.
    ///
    /// Returns `None` when idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the scanner cannot resolve `current`.
    pub fn scan_step(
        &mut self,
        current: &RawTimeRange,
        now: DateTime<Utc>,
    ) -> Result<Option<RawTimeRange>, DateMathError> {
        let Some(scanner) = &self.scanner else {
            return Ok(None);
        };
        let next = scanner.next_range(current, now)?;
        tracing::debug!(from = %next.from, to = %next.to, "Scan step");
        self.scan_range = Some(next.clone());
        Ok(Some(next))
    }

    /// Returns to `Idle`, discarding scanning transactions still in flight.
    ///
    /// Completed scanning transactions keep their results. Returns the number
    /// of transactions discarded.
    pub fn stop_scanning(&mut self, store: &mut TransactionStore) -> usize {
        let was_scanning = self.is_scanning();
        self.scanner = None;
        self.scan_range = None;
        let discarded = store.discard_live_scanning();
        if was_scanning {
            tracing::debug!(discarded, "Scan stopped");
        }
        discarded
    }
}
