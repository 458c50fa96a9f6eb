// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use tracing::{debug, warn};

use super::{IndexEntry, StepOutcome, WalkPosition, WalkerState};
use crate::db::{PiecePayloadStore, WalkerStateStore};
use crate::ipni::{AdvertisedPayload, ProviderClient, ProviderInfo};

/// Result of one transition of the walker state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// State to persist. [`None`] means nothing changed.
    pub new_state: Option<WalkerState>,
    pub index_entry: Option<IndexEntry>,
    pub outcome: StepOutcome,
}

impl StepResult {
    fn up_to_date() -> Self {
        Self {
            new_state: None,
            index_entry: None,
            outcome: StepOutcome::Finished,
        }
    }
}

/// What the next step has to do, decided without any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StepPlan {
    /// The provider cannot be walked over HTTP; record why and stop.
    Unsupported(WalkerState),
    /// The previous walk ended at the provider's current head.
    UpToDate,
    /// Fetch `tail`, continuing (or starting) the walk from `head`.
    Fetch {
        head: Cid,
        tail: Cid,
        state: WalkerState,
    },
}

fn plan_step(provider_info: &ProviderInfo, walker_state: Option<&WalkerState>) -> StepPlan {
    if !provider_info.is_http() {
        let mut state = walker_state.cloned().unwrap_or_default();
        state.position = WalkPosition::Idle;
        state.status = format!(
            "Index provider advertises over an unsupported protocol: {}",
            provider_info.provider_address
        );
        return StepPlan::Unsupported(state);
    }

    let next_head = provider_info.last_advertisement_cid;
    match walker_state {
        Some(state @ WalkerState {
            position: WalkPosition::Walking { head, tail },
            ..
        }) => StepPlan::Fetch {
            head: *head,
            tail: *tail,
            state: state.clone(),
        },
        Some(state) if state.last_head == Some(next_head) => StepPlan::UpToDate,
        previous => {
            let mut state = previous.cloned().unwrap_or_default();
            state.position = WalkPosition::Walking {
                head: next_head,
                tail: next_head,
            };
            state.status = format!("Walking the advertisements from {next_head}");
            StepPlan::Fetch {
                head: next_head,
                tail: next_head,
                state,
            }
        }
    }
}

/// Moves `state` past the advertisement at its tail, given what that advertisement contained.
fn advance(
    mut state: WalkerState,
    head: Cid,
    payload: &AdvertisedPayload,
) -> (WalkerState, StepOutcome) {
    let outcome = match payload.previous_advertisement_cid {
        Some(previous) if state.last_head != Some(previous) => {
            state.position = WalkPosition::Walking {
                head,
                tail: previous,
            };
            state.status = format!("Walking the advertisements from {head}, next step: {previous}");
            StepOutcome::InProgress
        }
        // Reached the chain's origin or the end of the previous walk.
        _ => {
            state.position = WalkPosition::Idle;
            state.last_head = Some(head);
            state.status = format!(
                "All advertisements from {head} to the end of the chain were processed."
            );
            StepOutcome::Finished
        }
    };
    if payload.entries_fetch_error() {
        state.entries_not_retrievable += 1;
    }
    if payload.has_entries() && payload.piece_cid().is_none() {
        state.ads_missing_piece_cid += 1;
    }
    (state, outcome)
}

/// Decides and performs one transition for `provider_id`. The only side effect is fetching the
/// advertisement at the walker's tail.
///
/// Fetch failures do not surface as errors: the returned state keeps the tail where it was and
/// records the failure in its status.
pub async fn process_next_advertisement(
    client: &ProviderClient,
    provider_id: &str,
    provider_info: &ProviderInfo,
    walker_state: Option<&WalkerState>,
) -> StepResult {
    let (head, tail, state) = match plan_step(provider_info, walker_state) {
        StepPlan::Unsupported(state) => {
            debug!(provider_id, "{}", state.status);
            return StepResult {
                new_state: Some(state),
                index_entry: None,
                outcome: StepOutcome::Finished,
            };
        }
        StepPlan::UpToDate => {
            debug!(provider_id, "No new advertisements since the last walk");
            return StepResult::up_to_date();
        }
        StepPlan::Fetch { head, tail, state } => (head, tail, state),
    };

    match client
        .fetch_advertised_payload(&provider_info.provider_address, &tail)
        .await
    {
        Ok(payload) => {
            let index_entry = payload
                .piece_cid()
                .zip(payload.payload_cid())
                .map(|(piece_cid, payload_cid)| IndexEntry {
                    piece_cid,
                    payload_cid,
                });
            let (new_state, outcome) = advance(state, head, &payload);
            StepResult {
                new_state: Some(new_state),
                index_entry,
                outcome,
            }
        }
        Err(e) => {
            warn!(
                provider_id,
                provider_address = %provider_info.provider_address,
                "Cannot process advertisement {tail}: {e}"
            );
            let mut new_state = state;
            new_state.status = format!("Error processing {tail}: {}", e.reason());
            StepResult {
                new_state: Some(new_state),
                index_entry: None,
                outcome: StepOutcome::Failed,
            }
        }
    }
}

/// Outcome of [`walk_one_step`], with the state now stored for the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkStep {
    pub outcome: StepOutcome,
    pub walker_state: Option<WalkerState>,
}

/// Loads the walker state (unless `cached` is given), runs one transition and persists its
/// results before returning.
pub async fn walk_one_step<DB>(
    db: &DB,
    client: &ProviderClient,
    provider_id: &str,
    provider_info: &ProviderInfo,
    cached: Option<WalkerState>,
) -> anyhow::Result<WalkStep>
where
    DB: WalkerStateStore + PiecePayloadStore + ?Sized,
{
    let walker_state = match cached {
        Some(state) => Some(state),
        None => db.get_walker_state(provider_id)?,
    };
    let StepResult {
        new_state,
        index_entry,
        outcome,
    } = process_next_advertisement(client, provider_id, provider_info, walker_state.as_ref())
        .await;

    let walker_state = match new_state {
        Some(new_state) => {
            db.set_walker_state(provider_id, &new_state)?;
            Some(new_state)
        }
        None => walker_state,
    };
    if let Some(IndexEntry {
        piece_cid,
        payload_cid,
    }) = index_entry
    {
        db.add_piece_payload_blocks(provider_id, &piece_cid, &[payload_cid])?;
    }
    Ok(WalkStep {
        outcome,
        walker_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDB;
    use crate::ipni::RAW_CODEC;
    use crate::ipni::client::AdvertisedEntries;
    use crate::test_utils::{
        MockIpniServer, TestAdvertisement, arbitrary_cid, identity_multihash_bytes, test_cid,
        test_multihash, unused_local_address,
    };
    use pretty_assertions::assert_eq;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    fn http_provider(address: String, head: Cid) -> ProviderInfo {
        ProviderInfo {
            provider_address: address,
            last_advertisement_cid: head,
        }
    }

    fn raw(seed: &str) -> Cid {
        Cid::new_v1(RAW_CODEC, test_multihash(seed))
    }

    /// `A <- B <- C`, all announcing a payload, only `A` and `C` with a piece.
    fn publish_chain(server: &MockIpniServer) -> [TestAdvertisement; 3] {
        let a = TestAdvertisement::new("A")
            .with_piece(test_cid("piece-a"))
            .with_payload(test_multihash("payload-a"));
        let b = TestAdvertisement::new("B")
            .with_previous(a.cid)
            .with_payload(test_multihash("payload-b"));
        let c = TestAdvertisement::new("C")
            .with_previous(b.cid)
            .with_piece(test_cid("piece-c"))
            .with_payload(test_multihash("payload-c"));
        for ad in [&a, &b, &c] {
            server.publish(ad);
        }
        [a, b, c]
    }

    #[tokio::test]
    async fn walks_the_chain_from_head_to_origin() {
        let server = MockIpniServer::start().await;
        let [a, b, c] = publish_chain(&server);
        let db = MemoryDB::default();
        let client = ProviderClient::default();
        let info = http_provider(server.url(), c.cid);

        let step = walk_one_step(&db, &client, "peer", &info, None).await.unwrap();
        assert_eq!(step.outcome, StepOutcome::InProgress);
        let state = step.walker_state.unwrap();
        assert_eq!(
            state.position,
            WalkPosition::Walking {
                head: c.cid,
                tail: b.cid
            }
        );
        assert_eq!(
            db.get_piece_payload_blocks("peer", &test_cid("piece-c")).unwrap(),
            vec![raw("payload-c")]
        );

        let step = walk_one_step(&db, &client, "peer", &info, Some(state))
            .await
            .unwrap();
        assert_eq!(step.outcome, StepOutcome::InProgress);
        let state = step.walker_state.unwrap();
        assert_eq!(state.tail(), Some(a.cid));
        assert_eq!(state.ads_missing_piece_cid, 1);

        // no cached copy: the state is read back from the store
        let step = walk_one_step(&db, &client, "peer", &info, None).await.unwrap();
        assert_eq!(step.outcome, StepOutcome::Finished);
        let state = db.get_walker_state("peer").unwrap().unwrap();
        assert_eq!(Some(&state), step.walker_state.as_ref());
        assert_eq!(state.position, WalkPosition::Idle);
        assert_eq!(state.last_head, Some(c.cid));
        assert_eq!(state.entries_not_retrievable, 0);
        assert_eq!(state.ads_missing_piece_cid, 1);
        assert_eq!(
            state.status,
            format!("All advertisements from {} to the end of the chain were processed.", c.cid)
        );
        assert_eq!(
            db.get_piece_payload_blocks("peer", &test_cid("piece-a")).unwrap(),
            vec![raw("payload-a")]
        );
        assert_eq!(db.count_pieces_indexed("peer").unwrap(), 2);

        // the head did not move, nothing to do
        let requests = server.request_count(&c.cid.to_string());
        let step = walk_one_step(&db, &client, "peer", &info, Some(state.clone()))
            .await
            .unwrap();
        assert_eq!(step.outcome, StepOutcome::Finished);
        assert_eq!(step.walker_state, Some(state.clone()));
        assert_eq!(server.request_count(&c.cid.to_string()), requests);
        assert_eq!(db.get_walker_state("peer").unwrap(), Some(state));
    }

    #[tokio::test]
    async fn new_advertisements_are_walked_down_to_the_previous_head() {
        let server = MockIpniServer::start().await;
        let [_, b, c] = publish_chain(&server);
        let d = TestAdvertisement::new("D")
            .with_previous(c.cid)
            .with_piece(test_cid("piece-d"))
            .with_payload(test_multihash("payload-d"));
        server.publish(&d);
        let previous = WalkerState {
            last_head: Some(c.cid),
            ads_missing_piece_cid: 1,
            ..Default::default()
        };

        let result = process_next_advertisement(
            &ProviderClient::default(),
            "peer",
            &http_provider(server.url(), d.cid),
            Some(&previous),
        )
        .await;
        assert_eq!(result.outcome, StepOutcome::Finished);
        let state = result.new_state.unwrap();
        assert_eq!(state.last_head, Some(d.cid));
        assert_eq!(state.position, WalkPosition::Idle);
        assert_eq!(state.ads_missing_piece_cid, 1);
        assert_eq!(
            result.index_entry,
            Some(IndexEntry {
                piece_cid: test_cid("piece-d"),
                payload_cid: raw("payload-d"),
            })
        );
        assert_eq!(server.request_count(&b.cid.to_string()), 0);
    }

    #[tokio::test]
    async fn empty_entries_advertisement_advances_without_index_entry() {
        let server = MockIpniServer::start().await;
        let genesis = TestAdvertisement::new("genesis");
        let removal = TestAdvertisement::new("removal").with_previous(genesis.cid);
        server.publish(&genesis);
        server.publish(&removal);

        let result = process_next_advertisement(
            &ProviderClient::default(),
            "peer",
            &http_provider(server.url(), removal.cid),
            None,
        )
        .await;
        assert_eq!(result.outcome, StepOutcome::InProgress);
        assert_eq!(result.index_entry, None);
        let state = result.new_state.unwrap();
        assert_eq!(state.tail(), Some(genesis.cid));
        assert_eq!(state.ads_missing_piece_cid, 0);
        assert_eq!(state.entries_not_retrievable, 0);
    }

    #[tokio::test]
    async fn unsampled_entry_advances_without_index_entry() {
        let server = MockIpniServer::start().await;
        let genesis = TestAdvertisement::new("genesis");
        let ad = TestAdvertisement::new("huge-entry")
            .with_previous(genesis.cid)
            .with_piece(test_cid("piece"))
            .with_payload(test_multihash("payload"));
        server.publish(&genesis);
        server.publish(&ad);
        server.serve_entries(ad.entries_cid(), &[identity_multihash_bytes(100)]);

        let result = process_next_advertisement(
            &ProviderClient::default(),
            "peer",
            &http_provider(server.url(), ad.cid),
            None,
        )
        .await;
        assert_eq!(result.outcome, StepOutcome::InProgress);
        assert_eq!(result.index_entry, None);
        let state = result.new_state.unwrap();
        assert_eq!(state.tail(), Some(genesis.cid));
        assert_eq!(state.ads_missing_piece_cid, 0);
        assert_eq!(state.entries_not_retrievable, 0);
    }

    #[tokio::test]
    async fn entries_404_is_counted_and_the_walk_advances() {
        let server = MockIpniServer::start().await;
        let [a, b, _] = publish_chain(&server);
        server.serve_status(b.entries_cid(), 404, "gone");

        let result = process_next_advertisement(
            &ProviderClient::default(),
            "peer",
            &http_provider(server.url(), b.cid),
            None,
        )
        .await;
        assert_eq!(result.outcome, StepOutcome::InProgress);
        assert_eq!(result.index_entry, None);
        let state = result.new_state.unwrap();
        assert_eq!(state.tail(), Some(a.cid));
        assert_eq!(state.entries_not_retrievable, 1);
        assert_eq!(state.ads_missing_piece_cid, 1);
    }

    #[tokio::test]
    async fn advertisement_404_keeps_the_tail() {
        let server = MockIpniServer::start().await;
        let missing = test_cid("missing");
        server.serve_status(missing.to_string(), 404, "Not Found");
        let walking = WalkerState {
            position: WalkPosition::Walking {
                head: test_cid("head"),
                tail: missing,
            },
            ..Default::default()
        };

        let result = process_next_advertisement(
            &ProviderClient::default(),
            "peer",
            &http_provider(server.url(), test_cid("head")),
            Some(&walking),
        )
        .await;
        assert_eq!(result.outcome, StepOutcome::Failed);
        assert_eq!(result.index_entry, None);
        let state = result.new_state.unwrap();
        assert_eq!(state.position, walking.position);
        assert_eq!(
            state.status,
            format!(
                "Error processing {missing}: HTTP request to {}/ipni/v1/ad/{missing} failed: 404 Not Found",
                server.url()
            )
        );
    }

    #[tokio::test]
    async fn unreachable_provider_fails_the_step() {
        let head = test_cid("head");
        let address = format!("http://{}", unused_local_address());
        let db = MemoryDB::default();

        let step = walk_one_step(
            &db,
            &ProviderClient::default(),
            "peer",
            &http_provider(address.clone(), head),
            None,
        )
        .await
        .unwrap();
        assert_eq!(step.outcome, StepOutcome::Failed);
        let state = db.get_walker_state("peer").unwrap().unwrap();
        assert_eq!(state.position, WalkPosition::Walking { head, tail: head });
        assert!(
            state.status.starts_with(&format!(
                "Error processing {head}: HTTP request to {address}/ipni/v1/ad/{head} failed: "
            )),
            "{}",
            state.status
        );
    }

    #[tokio::test]
    async fn unsupported_protocol_keeps_progress() {
        let db = MemoryDB::default();
        let previous = WalkerState {
            position: WalkPosition::Walking {
                head: test_cid("head"),
                tail: test_cid("tail"),
            },
            last_head: Some(test_cid("last")),
            status: String::new(),
            entries_not_retrievable: 2,
            ads_missing_piece_cid: 5,
        };
        db.set_walker_state("peer", &previous).unwrap();
        let info = ProviderInfo {
            provider_address: "/ip4/1.2.3.4/tcp/24001".into(),
            last_advertisement_cid: test_cid("new head"),
        };

        let step = walk_one_step(&db, &ProviderClient::default(), "peer", &info, None)
            .await
            .unwrap();
        assert_eq!(step.outcome, StepOutcome::Finished);
        assert_eq!(
            db.get_walker_state("peer").unwrap(),
            Some(WalkerState {
                position: WalkPosition::Idle,
                status: "Index provider advertises over an unsupported protocol: /ip4/1.2.3.4/tcp/24001".into(),
                ..previous
            })
        );
    }

    #[test]
    fn soft_404_without_piece_counts_both() {
        let payload = AdvertisedPayload {
            previous_advertisement_cid: None,
            entries: AdvertisedEntries::NotRetrievable { piece_cid: None },
        };
        let (state, outcome) = advance(WalkerState::default(), test_cid("head"), &payload);
        assert_eq!(outcome, StepOutcome::Finished);
        assert_eq!(state.entries_not_retrievable, 1);
        assert_eq!(state.ads_missing_piece_cid, 1);
    }

    #[derive(Debug, Clone)]
    struct IdleAtHead(WalkerState);

    impl Arbitrary for IdleAtHead {
        fn arbitrary(g: &mut Gen) -> Self {
            let mut state = WalkerState::arbitrary(g);
            state.position = WalkPosition::Idle;
            state.last_head = Some(arbitrary_cid(g));
            Self(state)
        }
    }

    #[quickcheck]
    fn idle_walker_at_the_current_head_has_nothing_to_do(IdleAtHead(state): IdleAtHead) {
        let info = http_provider("http://example.com".into(), state.last_head.unwrap());
        assert_eq!(plan_step(&info, Some(&state)), StepPlan::UpToDate);
    }

    #[quickcheck]
    fn an_active_walk_continues_from_its_tail(state: WalkerState, new_head: u64) {
        let info = http_provider(
            "http://example.com".into(),
            test_cid(&new_head.to_string()),
        );
        match (state.position, plan_step(&info, Some(&state))) {
            (
                WalkPosition::Walking { head, tail },
                StepPlan::Fetch {
                    head: planned_head,
                    tail: planned_tail,
                    state: planned_state,
                },
            ) => {
                assert_eq!((head, tail), (planned_head, planned_tail));
                assert_eq!(planned_state, state);
            }
            (WalkPosition::Idle, StepPlan::Fetch { head, tail, .. }) => {
                assert_eq!(head, info.last_advertisement_cid);
                assert_eq!(tail, info.last_advertisement_cid);
            }
            (_, plan) => assert_eq!(plan, StepPlan::UpToDate),
        }
    }

    #[quickcheck]
    fn non_http_providers_are_never_walked(state: Option<WalkerState>, port: u16) {
        let info = http_provider(format!("/ip4/127.0.0.1/tcp/{port}"), test_cid("head"));
        let StepPlan::Unsupported(planned) = plan_step(&info, state.as_ref()) else {
            panic!("expected an unsupported plan");
        };
        assert_eq!(planned.position, WalkPosition::Idle);
        assert_eq!(
            planned.last_head,
            state.as_ref().and_then(|state| state.last_head)
        );
        assert!(planned.status.ends_with(&info.provider_address));
    }
}
