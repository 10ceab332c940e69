//! Round-trip probing of the other peers.
//!
//! Each probe round pings every connected peer with a fresh code. Pongs are
//! matched back by code; a probe nobody answers within the timeout counts as
//! the timeout itself. The latest sample per peer goes into the
//! `LatencyReport` intent the host ranks peers by.

use log::debug;
use shared::{ClientId, Intent};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct LatencyProbe {
    outstanding: HashMap<String, (ClientId, Instant)>,
    samples: BTreeMap<ClientId, u32>,
    timeout: Duration,
}

impl LatencyProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            outstanding: HashMap::new(),
            samples: BTreeMap::new(),
            timeout,
        }
    }

    /// Starts a round, returning one ping per peer.
    pub fn start_round<'a>(
        &mut self,
        peers: impl IntoIterator<Item = &'a ClientId>,
        now: Instant,
    ) -> Vec<(ClientId, Intent)> {
        peers
            .into_iter()
            .map(|peer| {
                let code = uuid::Uuid::new_v4().to_string();
                self.outstanding.insert(code.clone(), (peer.clone(), now));
                (peer.clone(), Intent::Ping { code })
            })
            .collect()
    }

    /// Records a pong, returning the measured round trip in milliseconds.
    pub fn on_pong(&mut self, from: &ClientId, code: &str, now: Instant) -> Option<u32> {
        let (peer, sent) = self.outstanding.remove(code)?;
        if peer != *from {
            debug!("Pong {} came from {} but was sent to {}", code, from, peer);
            return None;
        }
        let rtt = now.saturating_duration_since(sent).as_millis().min(u32::MAX as u128) as u32;
        self.samples.insert(peer, rtt);
        Some(rtt)
    }

    /// Gives up on probes older than the timeout.
    pub fn expire(&mut self, now: Instant) {
        let timeout = self.timeout;
        let timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
        let samples = &mut self.samples;
        self.outstanding.retain(|code, (peer, sent)| {
            let alive = now.saturating_duration_since(*sent) < timeout;
            if !alive {
                debug!("Probe {} to {} timed out", code, peer);
                samples.insert(peer.clone(), timeout_ms);
            }
            alive
        });
    }

    pub fn forget(&mut self, peer: &ClientId) {
        self.samples.remove(peer);
        self.outstanding.retain(|_, (target, _)| target != peer);
    }

    pub fn sample(&self, peer: &ClientId) -> Option<u32> {
        self.samples.get(peer).copied()
    }

    /// The report to send to the host, or `None` before any sample exists.
    pub fn report(&self) -> Option<Intent> {
        if self.samples.is_empty() {
            return None;
        }
        Some(Intent::LatencyReport {
            entries: self.samples.iter().map(|(id, ms)| (id.clone(), *ms)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(intent: &Intent) -> String {
        match intent {
            Intent::Ping { code } => code.clone(),
            other => panic!("expected a ping, got {:?}", other),
        }
    }

    #[test]
    fn test_pong_measures_round_trip() {
        let mut probe = LatencyProbe::new(Duration::from_secs(2));
        let start = Instant::now();
        let b = ClientId::from("b");
        let pings = probe.start_round([&b], start);
        let code = code_of(&pings[0].1);

        let rtt = probe.on_pong(&b, &code, start + Duration::from_millis(35));
        assert_eq!(rtt, Some(35));
        assert_eq!(probe.report(), Some(Intent::LatencyReport { entries: vec![(b, 35)] }));
    }

    #[test]
    fn test_pong_from_wrong_peer_or_twice_is_ignored() {
        let mut probe = LatencyProbe::new(Duration::from_secs(2));
        let start = Instant::now();
        let b = ClientId::from("b");
        let code = code_of(&probe.start_round([&b], start)[0].1);

        assert_eq!(probe.on_pong(&ClientId::from("c"), &code, start), None);
        assert_eq!(probe.on_pong(&b, &code, start), None);
        assert!(probe.report().is_none());
    }

    #[test]
    fn test_unanswered_probe_counts_as_timeout() {
        let mut probe = LatencyProbe::new(Duration::from_millis(2000));
        let start = Instant::now();
        let b = ClientId::from("b");
        probe.start_round([&b], start);

        probe.expire(start + Duration::from_millis(500));
        assert_eq!(probe.sample(&b), None);
        probe.expire(start + Duration::from_millis(2500));
        assert_eq!(probe.sample(&b), Some(2000));
    }
}
