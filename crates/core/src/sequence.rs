//! Display sequence numbers for prescriptions and payments.
//!
//! The generator is injected rather than derived from live row counts, so
//! concurrent creations can never race on a stale count and mint the same
//! number. Formats: `PRE-YYYYMM-NNNN` for prescriptions,
//! `PAY-YYYYMMDD-NNNN` for payments.

use chrono::{DateTime, Datelike, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of human-readable sequence numbers.
pub trait SequenceGenerator: Send + Sync {
    fn prescription_number(&self, now: DateTime<Utc>) -> String;
    fn payment_number(&self, now: DateTime<Utc>) -> String;
}

/// Monotonic in-process counters.
#[derive(Debug, Default)]
pub struct CountingSequences {
    prescriptions: AtomicU64,
    payments: AtomicU64,
}

impl CountingSequences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume counting from known high-water marks, e.g. after reload.
    pub fn starting_at(prescriptions: u64, payments: u64) -> Self {
        Self {
            prescriptions: AtomicU64::new(prescriptions),
            payments: AtomicU64::new(payments),
        }
    }
}

impl SequenceGenerator for CountingSequences {
    fn prescription_number(&self, now: DateTime<Utc>) -> String {
        let n = self.prescriptions.fetch_add(1, Ordering::Relaxed) + 1;
        format!("PRE-{:04}{:02}-{:04}", now.year(), now.month(), n)
    }

    fn payment_number(&self, now: DateTime<Utc>) -> String {
        let n = self.payments.fetch_add(1, Ordering::Relaxed) + 1;
        format!(
            "PAY-{:04}{:02}{:02}-{:04}",
            now.year(),
            now.month(),
            now.day(),
            n
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_prescription_number_format() {
        let seq = CountingSequences::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();

        assert_eq!(seq.prescription_number(now), "PRE-202608-0001");
        assert_eq!(seq.prescription_number(now), "PRE-202608-0002");
    }

    #[test]
    fn test_payment_number_format() {
        let seq = CountingSequences::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();

        assert_eq!(seq.payment_number(now), "PAY-20260829-0001");
    }

    #[test]
    fn test_counters_are_independent() {
        let seq = CountingSequences::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();

        seq.prescription_number(now);
        seq.prescription_number(now);
        assert_eq!(seq.payment_number(now), "PAY-20260829-0001");
    }

    #[test]
    fn test_starting_at_resumes() {
        let seq = CountingSequences::starting_at(41, 7);
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();

        assert_eq!(seq.prescription_number(now), "PRE-202608-0042");
        assert_eq!(seq.payment_number(now), "PAY-20260829-0008");
    }

    #[test]
    fn test_concurrent_numbers_unique() {
        use std::sync::Arc;

        let seq = Arc::new(CountingSequences::new());
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| seq.payment_number(now))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();

        assert_eq!(all.len(), total);
    }
}
