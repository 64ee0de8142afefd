//! Desync detection by hash pairing.
//!
//! Each member periodically fingerprints its local simulation and submits
//! the hash. Submissions are grouped into [`HashPair`]s: a submission goes
//! to the oldest pair that is not yet full and has nothing from this user,
//! otherwise it opens a new pair. A pair expects one submission from every
//! member of the roster as it was when the pair opened.
//!
//! Full pairs are compared at the next tick boundary. Every submission
//! that differs from the first one counts as one error. Errors are logged
//! and counted; they never stop the room.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tickwire_protocol::{StateHash, UserId};

/// One member's fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSubmission {
    pub user: UserId,
    pub hash: u32,
    pub label: Option<String>,
}

impl HashSubmission {
    pub fn new(user: UserId, hash: StateHash) -> Self {
        match hash {
            StateHash::Raw(hash) => Self {
                user,
                hash,
                label: None,
            },
            StateHash::Labelled { label, hash } => Self {
                user,
                hash,
                label: Some(label),
            },
        }
    }
}

/// Submissions for one verification window.
#[derive(Debug, Clone)]
pub struct HashPair {
    expected_count: usize,
    submissions: Vec<HashSubmission>,
    opened_at: Instant,
}

impl HashPair {
    fn new(expected_count: usize, opened_at: Instant) -> Self {
        Self {
            expected_count,
            submissions: Vec::with_capacity(expected_count),
            opened_at,
        }
    }

    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    pub fn submissions(&self) -> &[HashSubmission] {
        &self.submissions
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Every expected member has submitted.
    pub fn is_full(&self) -> bool {
        self.submissions.len() >= self.expected_count
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.submissions.iter().any(|s| s.user == user)
    }

    /// Submissions whose hash differs from the first one.
    fn mismatches(&self) -> impl Iterator<Item = &HashSubmission> {
        let first = self.submissions.first().map(|s| s.hash);
        self.submissions
            .iter()
            .skip(1)
            .filter(move |s| Some(s.hash) != first)
    }
}

/// Outcome of one [`DivergenceDetector::verify`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Full pairs compared and removed.
    pub verified: usize,
    /// Submissions that disagreed with their pair's first submission.
    pub mismatches: usize,
}

/// The pending hash pairs of one room plus its running error count.
#[derive(Debug, Default)]
pub struct DivergenceDetector {
    pairs: VecDeque<HashPair>,
    error_count: u64,
}

impl DivergenceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `submission` to the oldest pair that can take it, or opens a
    /// new pair expecting `roster_size` submissions.
    pub fn submit(&mut self, submission: HashSubmission, roster_size: usize, now: Instant) {
        let slot = self
            .pairs
            .iter_mut()
            .find(|pair| !pair.is_full() && !pair.contains(submission.user));

        match slot {
            Some(pair) => pair.submissions.push(submission),
            None => {
                let mut pair = HashPair::new(roster_size.max(1), now);
                pair.submissions.push(submission);
                self.pairs.push_back(pair);
            }
        }
    }

    /// Compares and removes every full pair.
    pub fn verify(&mut self) -> VerifyReport {
        let mut report = VerifyReport::default();
        let mut error_count = self.error_count;

        self.pairs.retain(|pair| {
            if !pair.is_full() {
                return true;
            }
            report.verified += 1;
            if let Some(first) = pair.submissions.first() {
                for bad in pair.mismatches() {
                    error_count += 1;
                    report.mismatches += 1;
                    tracing::warn!(
                        error_count,
                        first_user = %first.user,
                        first_hash = format_args!("{:#010x}", first.hash),
                        first_label = first.label.as_deref().unwrap_or("-"),
                        user = %bad.user,
                        hash = format_args!("{:#010x}", bad.hash),
                        label = bad.label.as_deref().unwrap_or("-"),
                        "desync detected"
                    );
                }
            }
            false
        });

        self.error_count = error_count;
        report
    }

    /// Drops pairs that opened more than `timeout` before `now` and are
    /// still not full. Returns how many were dropped.
    pub fn evict_stale(&mut self, now: Instant, timeout: Duration) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|pair| {
            let stale = !pair.is_full() && now.saturating_duration_since(pair.opened_at) > timeout;
            if stale {
                tracing::debug!(
                    expected = pair.expected_count,
                    received = pair.submissions.len(),
                    "evicting unfilled hash pair"
                );
            }
            !stale
        });
        before - self.pairs.len()
    }

    /// Discards every pending pair. The error count is kept.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn pending_pairs(&self) -> impl ExactSizeIterator<Item = &HashPair> {
        self.pairs.iter()
    }

    /// Total mismatching submissions seen by this room.
    pub fn error_count(&self) -> u64 {
        self.error_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(user: u32, hash: u32) -> HashSubmission {
        HashSubmission::new(UserId(user), StateHash::Raw(hash))
    }

    #[test]
    fn test_three_users_agree() {
        let now = Instant::now();
        let mut det = DivergenceDetector::new();
        for user in 1..=3 {
            det.submit(raw(user, 0xAB), 3, now);
        }
        assert_eq!(det.pending_pairs().len(), 1);
        assert!(det.pending_pairs().next().unwrap().is_full());

        let report = det.verify();
        assert_eq!(report, VerifyReport { verified: 1, mismatches: 0 });
        assert_eq!(det.error_count(), 0);
        assert_eq!(det.pending_pairs().len(), 0);
    }

    #[test]
    fn test_one_of_three_disagrees() {
        let now = Instant::now();
        let mut det = DivergenceDetector::new();
        det.submit(raw(1, 0xAB), 3, now);
        det.submit(raw(2, 0xCD), 3, now);
        det.submit(raw(3, 0xAB), 3, now);

        let report = det.verify();
        assert_eq!(report.mismatches, 1);
        assert_eq!(det.error_count(), 1);
        assert_eq!(det.pending_pairs().len(), 0);
    }

    #[test]
    fn test_partial_pair_is_not_verified() {
        let now = Instant::now();
        let mut det = DivergenceDetector::new();
        det.submit(raw(1, 1), 2, now);
        assert_eq!(det.verify(), VerifyReport::default());
        assert_eq!(det.pending_pairs().len(), 1);
    }

    #[test]
    fn test_second_submission_from_same_user_opens_new_pair() {
        let now = Instant::now();
        let mut det = DivergenceDetector::new();
        det.submit(raw(1, 10), 2, now);
        det.submit(raw(1, 11), 2, now);
        det.submit(raw(2, 10), 2, now);
        det.submit(raw(2, 11), 2, now);

        let pairs: Vec<&HashPair> = det.pending_pairs().collect();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.is_full()));
        assert!(pairs[0].contains(UserId(2)));
        assert_eq!(pairs[0].submissions()[1].hash, 10);
        assert_eq!(pairs[1].submissions()[1].hash, 11);
        assert_eq!(det.verify().mismatches, 0);
    }

    #[test]
    fn test_labels_are_kept() {
        let sub = HashSubmission::new(UserId(4), StateHash::labelled("frame 12"));
        assert_eq!(sub.label.as_deref(), Some("frame 12"));
        assert_eq!(sub.hash, tickwire_protocol::stable_hash(b"frame 12"));
    }

    #[test]
    fn test_evict_stale_drops_only_old_unfilled_pairs() {
        let start = Instant::now();
        let later = start + Duration::from_secs(5);
        let mut det = DivergenceDetector::new();
        det.submit(raw(1, 1), 2, start);
        det.submit(raw(1, 2), 2, later);

        let now = start + Duration::from_secs(11);
        assert_eq!(det.evict_stale(now, Duration::from_secs(10)), 1);
        assert_eq!(det.pending_pairs().len(), 1);
        assert_eq!(det.error_count(), 0);
    }

    #[test]
    fn test_clear_keeps_error_count() {
        let now = Instant::now();
        let mut det = DivergenceDetector::new();
        det.submit(raw(1, 1), 2, now);
        det.submit(raw(2, 2), 2, now);
        det.verify();
        det.submit(raw(1, 3), 2, now);
        det.clear();
        assert_eq!(det.pending_pairs().len(), 0);
        assert_eq!(det.error_count(), 1);
    }
}
