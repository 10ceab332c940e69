//! Multi-peer tests over in-memory links
//!
//! These wire several peers into a full mesh inside one process and check
//! what every survivor observes when the host goes away.

use host::HostSettings;
use peer::runtime::{Command, Notice, PeerRuntime, RuntimeConfig, RuntimeHandle};
use peer::session::{SessionCoordinator, SessionEvent};
use peer::transport::{memory_link, DirectoryEvent, TransportChannel, TransportEvent};
use shared::{ClientId, EntityKind, GameConfig, HostEvent, Level};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::assert_ok;

type Inbox = mpsc::UnboundedReceiver<TransportEvent>;

/// Links every pair of `ids`; returns each peer's inbox and its links.
fn mesh(ids: &[&str]) -> BTreeMap<ClientId, (Inbox, Vec<Box<dyn TransportChannel>>)> {
    let mut senders = BTreeMap::new();
    let mut peers = BTreeMap::new();
    for id in ids {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(ClientId::from(*id), tx);
        peers.insert(ClientId::from(*id), (rx, Vec::new()));
    }
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            let (a, b) = (ClientId::from(*a), ClientId::from(*b));
            let (a_to_b, b_to_a) = memory_link(a.clone(), senders[&a].clone(), b.clone(), senders[&b].clone());
            peers.get_mut(&a).unwrap().1.push(Box::new(a_to_b) as Box<dyn TransportChannel>);
            peers.get_mut(&b).unwrap().1.push(Box::new(b_to_a) as Box<dyn TransportChannel>);
        }
    }
    peers
}

async fn wait_for<F: Fn(&Notice) -> bool>(handle: &mut RuntimeHandle, wanted: F) -> Notice {
    timeout(Duration::from_secs(10), async {
        loop {
            match handle.notices.recv().await {
                Some(notice) if wanted(&notice) => return notice,
                Some(_) => continue,
                None => panic!("runtime stopped"),
            }
        }
    })
    .await
    .expect("notice did not arrive in time")
}

/// MIGRATION TESTS
mod migration_tests {
    use super::*;

    /// Host A leaves with [B, C] remaining: B hosts on every survivor
    #[tokio::test]
    async fn survivors_agree_on_next_host_without_messages() {
        let mut peers = mesh(&["a", "b", "c"]);
        let mut coordinators = BTreeMap::new();
        let mut inboxes = BTreeMap::new();
        for (id, (inbox, links)) in std::mem::take(&mut peers) {
            let mut session = SessionCoordinator::new(id.clone(), ClientId::from("a"));
            for link in links {
                let peer = link.peer().clone();
                session.add_peer(peer, link);
            }
            coordinators.insert(id.clone(), session);
            inboxes.insert(id, inbox);
        }

        let a = ClientId::from("a");
        let b = ClientId::from("b");
        coordinators.get_mut(&a).unwrap().close_all();

        for id in ["b", "c"] {
            let id = ClientId::from(id);
            let inbox = inboxes.get_mut(&id).unwrap();
            let session = coordinators.get_mut(&id).unwrap();
            let mut events = Vec::new();
            while let Ok(event) = inbox.try_recv() {
                if let TransportEvent::Closed { peer } = event {
                    events.extend(session.on_peer_closed(&peer));
                }
            }
            assert_eq!(
                events,
                vec![SessionEvent::HostMigrated {
                    new_host: b.clone(),
                    is_local: id == b,
                }]
            );
            assert_eq!(session.host(), Some(&b));
            assert!(!session.is_connected(&a));
        }
    }

    /// A full session keeps running on B after A shuts down
    #[tokio::test]
    async fn session_continues_on_successor() {
        let ids = ["a", "b", "c"];
        let peers = mesh(&ids);
        let mut settings = HostSettings::new(GameConfig::default(), Level::arena());
        settings.tick_rate = 100;

        let mut handles = BTreeMap::new();
        for (id, (inbox, links)) in peers {
            let (directory_tx, directory_rx) = mpsc::unbounded_channel();
            for link in links {
                let peer = link.peer().clone();
                directory_tx.send(DirectoryEvent::PeerJoined { id: peer, link }).unwrap();
            }
            let mut config = RuntimeConfig::new(id.clone(), ClientId::from("a"), settings.clone());
            config.expected_peers = ids.len();
            config.probe_every = Duration::from_secs(3600);
            let (runtime, handle) = PeerRuntime::new(config, inbox, directory_rx);
            tokio::spawn(async move {
                // keep the directory open for the lifetime of the runtime
                let _directory = directory_tx;
                runtime.run().await
            });
            handles.insert(id, handle);
        }

        let a = ClientId::from("a");
        let b = ClientId::from("b");
        for id in ["b", "c"] {
            let handle = handles.get_mut(&ClientId::from(id)).unwrap();
            let notice = wait_for(handle, |n| matches!(n, Notice::Host(HostEvent::InitialData(_)))).await;
            if let Notice::Host(HostEvent::InitialData(data)) = notice {
                assert_eq!(data.players.len(), 3);
            }
            wait_for(handle, |n| matches!(n, Notice::Host(HostEvent::PeriodicUpdate(_)))).await;
        }

        assert_ok!(handles[&a].commands.send(Command::Shutdown));

        for id in ["b", "c"] {
            let id = ClientId::from(id);
            let expected_local = id == b;
            let handle = handles.get_mut(&id).unwrap();
            let notice = wait_for(handle, |n| matches!(n, Notice::Session(SessionEvent::HostMigrated { .. }))).await;
            match notice {
                Notice::Session(SessionEvent::HostMigrated { new_host, is_local }) => {
                    assert_eq!(new_host, b);
                    assert_eq!(is_local, expected_local);
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        // C hears about A's forfeit from B and keeps receiving updates
        let c = handles.get_mut(&ClientId::from("c")).unwrap();
        wait_for(c, |n| {
            matches!(
                n,
                Notice::Host(HostEvent::EntityDeath { id, kind: EntityKind::Player }) if id.as_str() == "a"
            )
        })
        .await;
        wait_for(c, |n| matches!(n, Notice::Host(HostEvent::PeriodicUpdate(_)))).await;

        for id in ["b", "c"] {
            assert_ok!(handles[&ClientId::from(id)].commands.send(Command::Shutdown));
        }
    }
}
