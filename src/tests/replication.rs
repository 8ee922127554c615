// Replication bookkeeping: push/pull flags, guarded pushes, concurrent writers

#[cfg(test)]
mod replication_tests {
    use std::sync::Arc;
    use std::thread;
    use tempfile::{tempdir, TempDir};

    use crate::clock::{Clock, ManualClock};
    use crate::error::{NotFoundReason, PeerRegistryError};
    use crate::peers::{
        indexes, GetAllOptions, LastPushUpdate, LedgerNodePeers, PeerInput, PeerRecord,
        PeerStatusInput, COLLECTION_NAME,
    };
    use crate::storage::{Database, RocksPeerCollection};

    const NODE: &str = "urn:uuid:ledger-node-r";

    fn open(dir: &TempDir, clock: Arc<ManualClock>) -> (Arc<RocksPeerCollection>, Arc<LedgerNodePeers>) {
        let db = Database::open(dir.path()).unwrap();
        let collection = Arc::new(RocksPeerCollection::open(db, COLLECTION_NAME).unwrap());
        indexes::init(collection.as_ref()).unwrap();
        let peers = LedgerNodePeers::new(NODE, collection.clone()).with_clock(clock);
        (collection, Arc::new(peers))
    }

    fn record(peers: &LedgerNodePeers, id: &str) -> PeerRecord {
        peers
            .get_all_records(&GetAllOptions::default())
            .unwrap()
            .into_iter()
            .find(|r| r.peer.id == id)
            .unwrap()
    }

    /// A peer that was pulled from after it was last pushed to
    fn pulled_since_push(id: &str) -> PeerInput {
        PeerInput::new(id).with_status(PeerStatusInput {
            last_push_at: Some(100),
            last_pull_at: Some(200),
            ..Default::default()
        })
    }

    #[test]
    fn test_push_requiring_pull_succeeds_once() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let (collection, peers) = open(&dir, clock.clone());
        let push_index = format!("{}.pushUpdates", COLLECTION_NAME);

        peers.add(pulled_since_push("p1")).unwrap();
        assert!(record(&peers, "p1").meta.pulled_after_push);
        assert_eq!(collection.index_entry_count(&push_index).unwrap(), 1);

        clock.advance(10);
        let result = peers
            .update_last_push_at(LastPushUpdate::new("p1").require_pulled_after_push())
            .unwrap();
        assert_eq!(result.matched, 1);
        assert_eq!(result.modified, 1);

        let stored = record(&peers, "p1");
        assert!(!stored.meta.pulled_after_push);
        assert_eq!(stored.peer.status.last_push_at, 1_010);
        assert_eq!(stored.peer.sequence, 1);
        assert_eq!(collection.index_entry_count(&push_index).unwrap(), 0);

        let err = peers
            .update_last_push_at(LastPushUpdate::new("p1").require_pulled_after_push())
            .unwrap_err();
        assert!(matches!(
            err,
            PeerRegistryError::NotFound {
                reason: NotFoundReason::PreconditionFailed,
                ..
            }
        ));
        assert_eq!(record(&peers, "p1").peer.sequence, 1);
    }

    #[test]
    fn test_pull_rearms_push() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let (_, peers) = open(&dir, clock.clone());

        peers.add(pulled_since_push("p1")).unwrap();
        peers
            .update_last_push_at(LastPushUpdate::new("p1").require_pulled_after_push())
            .unwrap();

        // A later pull, reported through a full update, sets the flag again
        clock.advance(50);
        let mut pulled: PeerInput = record(&peers, "p1").peer.into();
        let mut status = pulled.status.take().unwrap_or_default();
        status.last_pull_at = Some(clock.now_ms());
        pulled.status = Some(status);
        peers.update(pulled, false).unwrap();
        assert!(record(&peers, "p1").meta.pulled_after_push);

        peers
            .update_last_push_at(LastPushUpdate::new("p1").require_pulled_after_push())
            .unwrap();
        assert_eq!(record(&peers, "p1").peer.sequence, 2);
    }

    #[test]
    fn test_plain_push_recomputes_flag() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let (_, peers) = open(&dir, clock);

        peers.add(pulled_since_push("p1")).unwrap();
        peers
            .update_last_push_at(LastPushUpdate::new("p1").at(150))
            .unwrap();
        assert!(record(&peers, "p1").meta.pulled_after_push);

        peers
            .update_last_push_at(LastPushUpdate::new("p1").at(250))
            .unwrap();
        assert!(!record(&peers, "p1").meta.pulled_after_push);
    }

    #[test]
    fn test_push_guarded_by_max_updated() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let (_, peers) = open(&dir, clock.clone());

        peers.add(PeerInput::new("p1")).unwrap();
        let observed = record(&peers, "p1").meta.updated;

        // Another writer touches the peer after it was observed
        clock.advance(5);
        peers.mark_updated(["p1"]).unwrap();

        let err = peers
            .update_last_push_at(LastPushUpdate::new("p1").with_max_updated(observed))
            .unwrap_err();
        assert!(err.is_not_found());

        let err = peers
            .update_last_push_at(LastPushUpdate::new("ghost"))
            .unwrap_err();
        assert!(matches!(
            err,
            PeerRegistryError::NotFound {
                reason: NotFoundReason::Missing,
                ..
            }
        ));
    }

    #[test]
    fn test_concurrent_guarded_pushes_have_one_winner() {
        let dir = tempdir().unwrap();
        let (_, peers) = open(&dir, Arc::new(ManualClock::new(1_000)));
        peers.add(pulled_since_push("p1")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let peers = peers.clone();
                thread::spawn(move || {
                    peers
                        .update_last_push_at(LastPushUpdate::new("p1").require_pulled_after_push())
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(record(&peers, "p1").peer.sequence, 1);
    }

    #[test]
    fn test_concurrent_sequenced_updates_have_one_winner() {
        let dir = tempdir().unwrap();
        let (_, peers) = open(&dir, Arc::new(ManualClock::new(1_000)));
        peers.add(PeerInput::new("p1")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let peers = peers.clone();
                thread::spawn(move || {
                    let next = PeerInput::new("p1").with_sequence(1).with_reputation(i);
                    peers.update(next, true).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(peers.get("p1").unwrap().sequence, 1);
    }
}
