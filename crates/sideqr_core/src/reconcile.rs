//! Decode result reconciliation.
//!
//! Decoders report what is visible in one frame; the UI wants a stable set
//! of codes that does not flicker when a few frames fail to decode. The
//! reconciler keeps one [`TrackedCode`] per payload and only drops it once
//! it has gone unseen for longer than the debounce period.
//!
//! For each batch decoded at time `t`:
//! 1. Known payloads get the new bbox and `last_seen = t`; unknown ones are
//!    created and remembered as newly seen.
//! 2. Codes with `t - last_seen > debounce` are removed.
//! 3. The whole set is published to the [`VisibleCodesView`].
//! 4. Newly seen codes (if any) are returned for a single notification.
//!
//! A payload that expired and shows up again counts as newly seen.

use std::time::{Duration, Instant};

use crate::decode::{BoundingBox, DecodedSymbol};
use crate::view::VisibleCodesView;

/// Default debounce period.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// A code currently considered visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedCode {
    /// Decoded payload; identifies the code.
    pub payload: Vec<u8>,
    /// Location from the most recent sighting.
    pub bbox: BoundingBox,
    /// Time of the most recent sighting.
    pub last_seen: Instant,
}

impl TrackedCode {
    /// Payload as text, with invalid UTF-8 replaced.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Time since the last sighting, zero if `now` is earlier.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// Result of reconciling one batch.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Codes created by this batch, in first-sighting order.
    pub newly_seen: Vec<TrackedCode>,
    /// Payloads removed by expiry.
    pub expired: Vec<Vec<u8>>,
    /// Whether the published set differs from the previous one.
    pub view_changed: bool,
}

/// Owns the tracked code set.
pub struct ResultReconciler {
    debounce: Duration,
    codes: Vec<TrackedCode>,
    view: VisibleCodesView,
}

impl ResultReconciler {
    /// Create a reconciler publishing into `view`.
    ///
    /// A zero `debounce` falls back to [`DEFAULT_DEBOUNCE`].
    pub fn new(debounce: Duration, view: VisibleCodesView) -> Self {
        let debounce = if debounce.is_zero() {
            tracing::warn!(
                "[Reconciler] Zero debounce period, using default {:?}",
                DEFAULT_DEBOUNCE
            );
            DEFAULT_DEBOUNCE
        } else {
            debounce
        };

        Self {
            debounce,
            codes: Vec::new(),
            view,
        }
    }

    /// Current debounce period.
    pub fn debounce_period(&self) -> Duration {
        self.debounce
    }

    /// Change the debounce period. Zero is rejected and returns false.
    pub fn set_debounce_period(&mut self, debounce: Duration) -> bool {
        if debounce.is_zero() {
            return false;
        }
        self.debounce = debounce;
        true
    }

    /// Tracked codes in first-sighting order.
    pub fn codes(&self) -> &[TrackedCode] {
        &self.codes
    }

    /// The view this reconciler publishes to.
    pub fn view(&self) -> &VisibleCodesView {
        &self.view
    }

    /// Merge a decode batch observed at `now`.
    ///
    /// When a payload appears more than once in the batch, the last
    /// occurrence supplies the bbox and the code is announced once.
    pub fn reconcile(&mut self, symbols: &[DecodedSymbol], now: Instant) -> ReconcileOutcome {
        let mut new_payloads: Vec<&[u8]> = Vec::new();

        for symbol in symbols {
            match self.codes.iter_mut().find(|c| c.payload == symbol.payload) {
                Some(code) => {
                    code.bbox = symbol.bbox;
                    code.last_seen = now;
                }
                None => {
                    self.codes.push(TrackedCode {
                        payload: symbol.payload.clone(),
                        bbox: symbol.bbox,
                        last_seen: now,
                    });
                    new_payloads.push(&symbol.payload);
                }
            }
        }

        let debounce = self.debounce;
        let mut expired = Vec::new();
        self.codes.retain(|code| {
            let keep = code.age(now) <= debounce;
            if !keep {
                expired.push(code.payload.clone());
            }
            keep
        });

        let newly_seen: Vec<TrackedCode> = self
            .codes
            .iter()
            .filter(|code| new_payloads.contains(&code.payload.as_slice()))
            .cloned()
            .collect();

        if !expired.is_empty() {
            tracing::debug!("[Reconciler] Expired {} code(s)", expired.len());
        }
        for code in &newly_seen {
            tracing::info!("[Reconciler] New code: {}", code.payload_text());
        }

        let view_changed = self.view.publish(self.codes.clone());

        ReconcileOutcome {
            newly_seen,
            expired,
            view_changed,
        }
    }

    /// Drop every tracked code and publish the empty set.
    pub fn clear(&mut self) {
        self.codes.clear();
        self.view.publish(Vec::new());
    }
}
