//! Latency reports and the host priority order derived from them.
//!
//! Every peer periodically pings all others and reports the round trip times
//! to the host. The host ranks peers by the median latency others measured to
//! them; that ranking is replicated in each `PeriodicUpdate` and decides who
//! takes over if the host leaves.

use shared::math::median;
use shared::ClientId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct LatencyBook {
    /// measured peer -> reporting peer -> milliseconds
    reports: BTreeMap<ClientId, BTreeMap<ClientId, u32>>,
}

impl LatencyBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a report; later reports from the same reporter overwrite earlier ones.
    pub fn record(&mut self, reporter: &ClientId, entries: &[(ClientId, u32)]) {
        for (measured, millis) in entries {
            if measured == reporter {
                continue;
            }
            self.reports
                .entry(measured.clone())
                .or_default()
                .insert(reporter.clone(), *millis);
        }
    }

    /// Drops a departed peer both as a subject and as a reporter.
    pub fn forget(&mut self, peer: &ClientId) {
        self.reports.remove(peer);
        for by_reporter in self.reports.values_mut() {
            by_reporter.remove(peer);
        }
    }

    pub fn median_for(&self, peer: &ClientId) -> Option<f32> {
        let samples: Vec<f32> = self.reports.get(peer)?.values().map(|ms| *ms as f32).collect();
        median(&samples)
    }

    /// Orders `roster` by ascending median reported latency.
    ///
    /// Peers nobody reported on count as `timeout_ms`. Ties keep id order so
    /// every peer computes the same list.
    pub fn host_priority<'a>(&self, roster: impl IntoIterator<Item = &'a ClientId>, timeout_ms: u32) -> Vec<ClientId> {
        let mut ranked: Vec<(f32, ClientId)> = roster
            .into_iter()
            .map(|id| (self.median_for(id).unwrap_or(timeout_ms as f32), id.clone()))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        ranked.into_iter().map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn id(s: &str) -> ClientId {
        ClientId::from(s)
    }

    #[test]
    fn test_priority_by_median() {
        let mut book = LatencyBook::new();
        book.record(&id("a"), &[(id("b"), 80), (id("c"), 20)]);
        book.record(&id("b"), &[(id("a"), 50), (id("c"), 40)]);
        book.record(&id("c"), &[(id("a"), 70), (id("b"), 90)]);

        assert_approx_eq!(book.median_for(&id("c")).unwrap(), 30.0);
        let roster = [id("a"), id("b"), id("c")];
        assert_eq!(book.host_priority(&roster, 2000), vec![id("c"), id("a"), id("b")]);
    }

    #[test]
    fn test_unreported_peer_ranks_last() {
        let mut book = LatencyBook::new();
        book.record(&id("a"), &[(id("b"), 10)]);
        let roster = [id("a"), id("b"), id("z")];
        // a and z both fall back to the timeout; id order breaks the tie
        assert_eq!(book.host_priority(&roster, 2000), vec![id("b"), id("a"), id("z")]);
    }

    #[test]
    fn test_forget_removes_reporter_and_subject() {
        let mut book = LatencyBook::new();
        book.record(&id("a"), &[(id("b"), 10)]);
        book.record(&id("b"), &[(id("a"), 30)]);
        book.forget(&id("a"));
        assert!(book.median_for(&id("a")).is_none());
        assert!(book.median_for(&id("b")).is_none());
    }

    #[test]
    fn test_self_reports_ignored() {
        let mut book = LatencyBook::new();
        book.record(&id("a"), &[(id("a"), 0)]);
        assert!(book.median_for(&id("a")).is_none());
    }
}
