//! Session membership, host priority and intent routing
//!
//! Every peer runs a [`SessionCoordinator`]. It owns the links to the other
//! peers and a replicated host priority list. The list starts out as the
//! roster sorted by id with the initial host first, and from then on is
//! replaced by whatever the host puts in each periodic update. Because all
//! peers hold the same list before anyone leaves, a departing host is
//! replaced by the same successor everywhere without any election traffic.
//!
//! ## Routing
//!
//! [`SessionCoordinator::send_to_host`] never drops an intent. When the local
//! peer is the host the intent comes back as [`Route::Loopback`] for the
//! caller to hand to its own simulation. When the host link is gone the
//! intent comes back inside [`SessionError::HostUnavailable`] and can be
//! parked with [`SessionCoordinator::defer`] until the next migration.

use crate::error::SessionError;
use crate::transport::TransportChannel;
use log::{debug, info, warn};
use shared::{ClientId, HostEvent, Intent, Message};
use std::collections::{BTreeMap, VecDeque};

/// Where a host-bound intent went.
#[derive(Debug, PartialEq)]
pub enum Route {
    /// The local peer is the host; apply the intent locally.
    Loopback(Intent),
    Sent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PeerLeft { id: ClientId },
    HostMigrated { new_host: ClientId, is_local: bool },
    /// Nobody is left to host.
    SessionEnded,
}

pub struct SessionCoordinator {
    local: ClientId,
    host: Option<ClientId>,
    links: BTreeMap<ClientId, Box<dyn TransportChannel>>,
    host_priority: Vec<ClientId>,
    /// Set once a host has sent its own priority list.
    priority_replicated: bool,
    deferred: VecDeque<Intent>,
}

impl SessionCoordinator {
    pub fn new(local: ClientId, initial_host: ClientId) -> Self {
        let mut session = Self {
            local,
            host: Some(initial_host),
            links: BTreeMap::new(),
            host_priority: Vec::new(),
            priority_replicated: false,
            deferred: VecDeque::new(),
        };
        session.rebuild_initial_priority();
        session
    }

    pub fn local(&self) -> &ClientId {
        &self.local
    }

    pub fn host(&self) -> Option<&ClientId> {
        self.host.as_ref()
    }

    pub fn is_host(&self) -> bool {
        self.host.as_ref() == Some(&self.local)
    }

    pub fn host_priority(&self) -> &[ClientId] {
        &self.host_priority
    }

    /// Connected remote peers.
    pub fn peers(&self) -> impl Iterator<Item = &ClientId> + '_ {
        self.links.keys()
    }

    pub fn peer_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_connected(&self, id: &ClientId) -> bool {
        self.links.contains_key(id)
    }

    pub fn add_peer(&mut self, id: ClientId, link: Box<dyn TransportChannel>) {
        if id == self.local {
            warn!("Ignoring a link to ourselves");
            return;
        }
        if let Some(previous) = self.links.insert(id.clone(), link) {
            previous.close();
        }
        info!("Peer {} joined ({} connected)", id, self.links.len());
        if !self.priority_replicated {
            self.rebuild_initial_priority();
        } else if !self.host_priority.contains(&id) {
            self.host_priority.push(id);
        }
    }

    /// Initial host first, then everyone else by id.
    fn rebuild_initial_priority(&mut self) {
        let mut order: Vec<ClientId> = self
            .links
            .keys()
            .cloned()
            .chain(std::iter::once(self.local.clone()))
            .filter(|id| Some(id) != self.host.as_ref())
            .collect();
        order.sort();
        if let Some(host) = &self.host {
            order.insert(0, host.clone());
        }
        self.host_priority = order;
    }

    /// Adopts the priority list carried by a periodic update.
    pub fn set_host_priority(&mut self, priority: &[ClientId]) {
        let mut order: Vec<ClientId> = priority
            .iter()
            .filter(|id| **id == self.local || self.links.contains_key(*id) || self.host.as_ref() == Some(*id))
            .cloned()
            .collect();
        order.dedup();
        if !order.contains(&self.local) {
            order.push(self.local.clone());
        }
        self.host_priority = order;
        self.priority_replicated = true;
    }

    /// Handles a closed link or a directory departure.
    ///
    /// Returns `None` when the peer was already gone, so reporting the same
    /// departure twice can never elect two hosts.
    pub fn on_peer_closed(&mut self, id: &ClientId) -> Option<SessionEvent> {
        let link = self.links.remove(id)?;
        link.close();
        self.host_priority.retain(|entry| entry != id);

        if self.host.as_ref() != Some(id) {
            info!("Peer {} left", id);
            return Some(SessionEvent::PeerLeft { id: id.clone() });
        }

        self.host = self.host_priority.first().cloned();
        match &self.host {
            Some(new_host) => {
                let is_local = *new_host == self.local;
                info!(
                    "Host {} left, {} takes over{}",
                    id,
                    new_host,
                    if is_local { " (us)" } else { "" }
                );
                Some(SessionEvent::HostMigrated {
                    new_host: new_host.clone(),
                    is_local,
                })
            }
            None => {
                warn!("Host {} left and nobody can take over", id);
                Some(SessionEvent::SessionEnded)
            }
        }
    }

    /// Routes an intent to the current host.
    pub fn send_to_host(&self, intent: Intent) -> Result<Route, SessionError> {
        let Some(host) = &self.host else {
            return Err(SessionError::HostUnavailable(intent));
        };
        if *host == self.local {
            return Ok(Route::Loopback(intent));
        }
        let Some(link) = self.links.get(host) else {
            return Err(SessionError::HostUnavailable(intent));
        };
        let message = Message::Intent {
            sender: self.local.clone(),
            intent: intent.clone(),
        };
        match link.send(&message) {
            Ok(()) => Ok(Route::Sent),
            Err(e) => {
                debug!("Send to host {} failed: {}", host, e);
                Err(SessionError::HostUnavailable(intent))
            }
        }
    }

    /// Sends a message to one peer, used for ping/pong probes.
    pub fn send_to(&self, peer: &ClientId, message: &Message) -> Result<(), SessionError> {
        let link = self
            .links
            .get(peer)
            .ok_or_else(|| SessionError::UnknownPeer(peer.clone()))?;
        link.send(message)?;
        Ok(())
    }

    /// Sends a host event to every connected peer, returning how many got it.
    pub fn broadcast(&self, event: &HostEvent) -> usize {
        let message = Message::Host(event.clone());
        let mut delivered = 0;
        for (id, link) in &self.links {
            match link.send(&message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to send update to {}: {}", id, e),
            }
        }
        delivered
    }

    /// Parks an intent until the next host is known.
    pub fn defer(&mut self, intent: Intent) {
        self.deferred.push_back(intent);
    }

    pub fn take_deferred(&mut self) -> Vec<Intent> {
        self.deferred.drain(..).collect()
    }

    /// Closes every link, e.g. on shutdown.
    pub fn close_all(&mut self) {
        for link in self.links.values() {
            link.close();
        }
        self.links.clear();
    }
}
