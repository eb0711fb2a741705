//! Property tests for pull paging over the server oplog.

use chrono::{TimeZone, Utc};
use notesync_protocol::{Checkpoint, Delta, DeviceId, EntityId, EntityPayload, PullRequest, PushRequest};
use notesync_server::{ServerConfig, SyncServer};
use proptest::prelude::*;

fn populated(count: usize, max_pull: u32) -> (SyncServer, Vec<Delta>) {
    let server = SyncServer::new(ServerConfig::new().with_max_pull_batch(max_pull));
    let device = DeviceId::generate();
    let changes: Vec<Delta> = (0..count)
        .map(|i| {
            Delta::create(
                EntityId::new(),
                EntityPayload::note(format!("n{i}"), ""),
                Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
                device,
            )
        })
        .collect();
    server
        .handle_push(PushRequest::new(device, Checkpoint::initial(), changes.clone()))
        .unwrap();
    (server, changes)
}

proptest! {
    #[test]
    fn paging_returns_every_change_once(count in 0usize..60, max_pull in 1u32..20, hint in proptest::option::of(1u32..30)) {
        let (server, expected) = populated(count, max_pull);

        let mut checkpoint = Checkpoint::initial();
        let mut seen = Vec::new();
        loop {
            let page = server.handle_pull(PullRequest::new(checkpoint.clone(), hint)).unwrap();
            prop_assert!(page.changes.len() <= max_pull as usize);
            seen.extend(page.changes);
            checkpoint = page.next_checkpoint;
            if !page.has_more {
                break;
            }
        }

        prop_assert_eq!(seen, expected);
        if count > 0 {
            prop_assert_eq!(checkpoint, Checkpoint::new(count.to_string()));
        } else {
            prop_assert!(checkpoint.is_initial());
        }
    }

    #[test]
    fn repeated_push_never_grows_log(count in 1usize..20, repeats in 1usize..4) {
        let (server, changes) = populated(count, 100);
        let device = changes[0].device_id();
        for _ in 0..repeats {
            let response = server
                .handle_push(PushRequest::new(device, Checkpoint::initial(), changes.clone()))
                .unwrap();
            prop_assert_eq!(response.accepted as usize, count);
        }
        prop_assert_eq!(server.operation_count(), count);
    }
}
