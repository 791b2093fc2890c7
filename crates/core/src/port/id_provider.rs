// ID Provider Port (Job Identifier Generator)

use crate::domain::job::{JobId, JOB_DIR_PREFIX};
use crate::port::TimeProvider;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Length of the random part of a job ID
pub const ID_SUFFIX_LEN: usize = 6;

const STAMP_FORMAT: &str = "%Y%m%d_%Hh%Mm%Ss";

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique job ID
    fn generate_id(&self) -> JobId;
}

/// Suffixes handed out during the current second
struct IssuedSecond {
    second: i64,
    suffixes: HashSet<String>,
}

/// Timestamp + random suffix provider (production)
///
/// IDs look like `job_20240315_14h03m59s_k3x9qa`. The timestamp is UTC with
/// second resolution; the suffix separates jobs created in the same second.
/// The provider never issues the same ID twice: it redraws a suffix already
/// used this second, and it never lets its second counter go backwards.
pub struct TimestampIdProvider {
    time_provider: Arc<dyn TimeProvider>,
    issued: Mutex<IssuedSecond>,
}

impl TimestampIdProvider {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            time_provider,
            issued: Mutex::new(IssuedSecond {
                second: i64::MIN,
                suffixes: HashSet::new(),
            }),
        }
    }
}

fn format_stamp(second: i64) -> String {
    chrono::DateTime::from_timestamp(second, 0)
        .unwrap_or_default()
        .format(STAMP_FORMAT)
        .to_string()
}

fn random_suffix(rng: &mut impl Rng) -> String {
    (0..ID_SUFFIX_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)).to_ascii_lowercase())
        .collect()
}

impl IdProvider for TimestampIdProvider {
    fn generate_id(&self) -> JobId {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);

        let now_second = self.time_provider.now_millis().div_euclid(1000);
        if now_second > issued.second {
            issued.second = now_second;
            issued.suffixes.clear();
        }

        let stamp = format_stamp(issued.second);
        let mut rng = rand::thread_rng();
        loop {
            let suffix = random_suffix(&mut rng);
            if issued.suffixes.insert(suffix.clone()) {
                return JobId::new(format!("{}{}_{}", JOB_DIR_PREFIX, stamp, suffix));
            }
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic IDs: job_19700101_00h00m00s_000001, _000002, ...
    #[derive(Default)]
    pub struct SequentialIdProvider {
        counter: AtomicU64,
    }

    impl SequentialIdProvider {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl IdProvider for SequentialIdProvider {
        fn generate_id(&self) -> JobId {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            JobId::new(format!("{}19700101_00h00m00s_{:06}", JOB_DIR_PREFIX, n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::time_provider::mocks::ManualClock;
    use std::time::Duration;

    // 2024-03-15T14:03:59Z
    const T0: i64 = 1_710_511_439_000;

    #[test]
    fn test_id_format() {
        let provider = TimestampIdProvider::new(Arc::new(ManualClock::new(T0)));
        let id = provider.generate_id();
        let s = id.as_str();

        assert!(s.starts_with("job_20240315_14h03m59s_"), "got {}", s);
        let suffix = &s["job_20240315_14h03m59s_".len()..];
        assert_eq!(suffix.len(), ID_SUFFIX_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_no_duplicates_within_one_second() {
        let provider = TimestampIdProvider::new(Arc::new(ManualClock::new(T0)));
        let ids: HashSet<JobId> = (0..5_000).map(|_| provider.generate_id()).collect();
        assert_eq!(ids.len(), 5_000);
    }

    #[test]
    fn test_ids_sort_by_creation_second() {
        let clock = Arc::new(ManualClock::new(T0));
        let provider = TimestampIdProvider::new(clock.clone());

        let first = provider.generate_id();
        clock.advance(Duration::from_secs(1));
        let second = provider.generate_id();

        assert!(first < second);
    }

    #[test]
    fn test_clock_stepping_back_does_not_reuse_old_second() {
        let clock = Arc::new(ManualClock::new(T0 + 10_000));
        let provider = TimestampIdProvider::new(clock.clone());

        let later = provider.generate_id();
        clock.set(T0);
        let after_step_back = provider.generate_id();

        assert_ne!(later, after_step_back);
        assert!(after_step_back.as_str().starts_with("job_20240315_14h04m09s_"));
    }

    #[test]
    fn test_concurrent_generation_is_unique() {
        let provider = Arc::new(TimestampIdProvider::new(Arc::new(ManualClock::new(T0))));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = provider.clone();
                std::thread::spawn(move || (0..500).map(|_| p.generate_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id), "duplicate id generated");
            }
        }
        assert_eq!(all.len(), 4_000);
    }
}
