//! End-to-end deconstruction tests over a paired host/client session.
//!
//! Every test drives both processes through the loopback transport and
//! checks the state each side ends up in.

use coop_core::prelude::*;
use coop_test_utils::fixtures::{group, group_counts, pos, standard_catalog};
use coop_test_utils::harness::{assert_conserved, CoopPair, CLIENT_INVENTORY, HOST_INVENTORY};

fn scenario_a_refund() -> Vec<GroupId> {
    vec![group("Iron"), group("Iron"), group("Carbon"), group("Iron")]
}

/// Standard catalog whose foundation refunds an ingredient nobody defined.
fn catalog_with_missing_ingredient() -> GroupCatalog {
    let mut catalog = standard_catalog();
    catalog.insert(Group::constructible(
        "Foundation",
        "Foundation",
        [group("Iron"), group("Gold")],
    ));
    catalog
}

fn deconstruct_outcome(result: &Result<Received>) -> Option<&DeconstructOutcome> {
    match result {
        Ok(Received::Deconstruct(outcome)) => Some(outcome),
        _ => None,
    }
}

// =============================================================================
// Client request
// =============================================================================

mod client_request {
    use super::*;

    #[test]
    fn test_scenario_a_refund_reaches_client() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(4, 0, 4), &["Panel"], false);

        assert_eq!(pair.client_deconstruct(target), HookDecision::Veto);

        let host_results = pair.deliver_to_host();
        assert_eq!(host_results.len(), 1);
        let Some(DeconstructOutcome::Authorized { item_ids, groups, .. }) =
            deconstruct_outcome(&host_results[0])
        else {
            panic!("host did not authorize: {host_results:?}");
        };
        assert_eq!(item_ids.len(), 4);
        assert_conserved(&scenario_a_refund(), groups);

        let client_results = pair.deliver_to_client();
        assert!(client_results.iter().all(|r| r.is_ok()), "{client_results:?}");

        // each id resolves to a spawned object of the right group
        let mirrored: Vec<GroupId> = item_ids
            .iter()
            .map(|id| pair.client.world.live_object(*id).unwrap().group.clone())
            .collect();
        assert_eq!(&mirrored, groups);
        assert_conserved(&scenario_a_refund(), &pair.client.received_groups());
        assert!(pair.host.received_groups().is_empty());
    }

    #[test]
    fn test_base_recipe_precedes_panel_recipes() {
        let mut pair = CoopPair::new(standard_catalog());
        let target =
            pair.spawn_structure("Foundation", pos(0, 0, 0), &["WindowPanel", "Panel"], false);

        pair.client_deconstruct(target);
        let results = pair.deliver_to_host();
        let Some(DeconstructOutcome::Authorized { groups, .. }) = deconstruct_outcome(&results[0])
        else {
            panic!("host did not authorize: {results:?}");
        };

        assert_eq!(&groups[..3], &[group("Iron"), group("Iron"), group("Carbon")]);
        assert_conserved(&[group("Glass"), group("Iron"), group("Iron")], &groups[3..]);
    }

    #[test]
    fn test_structure_stays_until_host_replies() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(1, 0, 1), &[], false);

        pair.client_deconstruct(target);

        assert!(pair.client.world.is_live(target));
        assert!(pair.client.session.mirror().contains(target));
        assert_eq!(
            pair.client.session.tracker().phase(target),
            Some(DeconstructPhase::Requested { since_tick: 0 })
        );
        assert_eq!(pair.client.world.animation_stops(), 1);

        pair.pump();

        assert!(!pair.client.world.is_live(target));
        assert_eq!(pair.client.session.tracker().phase(target), Some(DeconstructPhase::Applied));
        assert!(pair.client.session.tracker().awaiting_reply().is_empty());
    }

    #[test]
    fn test_both_sides_destroy_exactly_once() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(1, 0, 1), &["Panel"], false);

        pair.client_deconstruct(target);
        pair.pump();

        assert!(!pair.host.world.is_live(target));
        assert!(!pair.client.world.is_live(target));
        assert_eq!(pair.host.world.double_destroys(), 0);
        assert_eq!(pair.client.world.double_destroys(), 0);
        assert!(pair.host.session.mirror().is_destroyed(target));
        assert!(pair.client.session.mirror().is_destroyed(target));
    }

    #[test]
    fn test_client_request_carries_no_items() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &[], false);
        let config = SessionConfig {
            flush_on_send: false,
            ..SessionConfig::default()
        };
        let (transport, _peer) = LoopbackTransport::channel();
        let mut client = Session::new(Role::Client, config, CLIENT_INVENTORY, Box::new(transport));
        client
            .register(pair.client.session.mirror().lookup(target).unwrap().clone(), None)
            .unwrap();

        client.request_deconstruct(&mut pair.client.world, target).unwrap();

        assert_eq!(
            client.pending_messages(),
            &[Message::Deconstruct(MessageDeconstruct::request(target))]
        );
    }

    #[test]
    fn test_repeated_request_is_answered_once() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &["Panel"], false);

        pair.client_deconstruct(target);
        pair.client.session.tick();
        pair.client_deconstruct(target);
        assert_eq!(
            pair.client.session.tracker().phase(target),
            Some(DeconstructPhase::Requested { since_tick: 1 })
        );

        let results = pair.deliver_to_host();
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(SyncError::AlreadyDestroyed(target)));

        pair.pump();
        assert_conserved(&scenario_a_refund(), &pair.client.received_groups());
    }

    #[test]
    fn test_requests_wait_for_tick_without_flush_on_send() {
        let config = SessionConfig {
            flush_on_send: false,
            ..SessionConfig::default()
        };
        let mut pair = CoopPair::with_config(standard_catalog(), config, 8, 8);
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &[], false);

        pair.client_deconstruct(target);
        assert_eq!(pair.host.in_flight(), 0);

        let report = pair.client.session.tick();
        assert_eq!(report.flushed, 1);
        assert_eq!(report.awaiting_reply, 1);
        assert_eq!(pair.host.in_flight(), 1);
    }
}

// =============================================================================
// Inventory resolution on the client
// =============================================================================

mod refund_placement {
    use super::*;

    #[test]
    fn test_scenario_b_full_inventory_drops_on_floor() {
        let mut pair = CoopPair::with_capacities(standard_catalog(), 8, 0);
        let target = pair.spawn_structure("Panel", pos(2, 0, 3), &[], false);

        pair.client_deconstruct(target);
        pair.deliver_to_host();
        let results = pair.deliver_to_client();

        let Some(DeconstructOutcome::Applied { refunds, skipped, .. }) =
            results.iter().find_map(deconstruct_outcome)
        else {
            panic!("client did not apply: {results:?}");
        };
        assert!(skipped.is_empty());
        assert_eq!(refunds.len(), 1);
        assert_eq!(
            refunds[0].placement,
            RefundPlacement::Dropped {
                position: pos(2, 1, 3)
            }
        );
        assert_eq!(refunds[0].notification.kind, InformationKind::DropOnFloor);

        let kinds: Vec<_> = pair.client.world.notifications().iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![InformationKind::DropOnFloor]);
        assert_eq!(pair.client.world.floor().len(), 1);
        assert_eq!(pair.client.session.stats().refunds_dropped, 1);
    }

    #[test]
    fn test_overflow_splits_between_inventory_and_floor() {
        let mut pair = CoopPair::with_capacities(standard_catalog(), 8, 2);
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &["Panel"], false);

        pair.client_deconstruct(target);
        pair.pump();

        let inventory = pair.client.world.inventory(CLIENT_INVENTORY).unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(pair.client.world.floor().len(), 2);
        assert_eq!(pair.client.world.notifications().len(), 4);
        assert_conserved(&scenario_a_refund(), &pair.client.received_groups());
    }

    #[test]
    fn test_notifications_carry_configured_lifetime() {
        let config = SessionConfig {
            notification_lifetime_ms: 1000,
            ..SessionConfig::default()
        };
        let mut pair = CoopPair::with_config(standard_catalog(), config, 8, 8);
        let target = pair.spawn_structure("Panel", pos(0, 0, 0), &[], false);

        pair.client_deconstruct(target);
        pair.pump();

        let notification = &pair.client.world.notifications()[0];
        assert_eq!(notification.kind, InformationKind::InInventory);
        assert_eq!(notification.lifetime_ms, 1000);
        assert_eq!(notification.label, "Iron");
    }
}

// =============================================================================
// Host's own deconstruction
// =============================================================================

mod host_action {
    use super::*;

    #[test]
    fn test_host_credits_own_inventory_and_client_mirrors() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(3, 0, 3), &["Panel"], false);

        assert_eq!(pair.host_deconstruct(target), HookDecision::Veto);
        assert!(!pair.host.world.is_live(target));
        assert_conserved(&scenario_a_refund(), &pair.host.received_groups());
        assert_eq!(
            pair.host.world.inventory(HOST_INVENTORY).unwrap().len(),
            4
        );

        let results = pair.deliver_to_client();
        let Some(DeconstructOutcome::Mirrored { unresolved, .. }) =
            results.iter().find_map(deconstruct_outcome)
        else {
            panic!("client did not mirror: {results:?}");
        };
        assert!(unresolved.is_empty());
        assert!(!pair.client.world.is_live(target));
        assert!(pair.client.received_groups().is_empty());
        assert!(pair.client.world.notifications().is_empty());
    }

    #[test]
    fn test_host_syncs_reset_transform_before_refund() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Panel", pos(3, 0, 3), &[], false);

        pair.host_deconstruct(target);
        let results = pair.deliver_to_client();

        assert_eq!(
            results[0],
            Ok(Received::WorldObject {
                id: target,
                created: false
            })
        );
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_host_action_on_untracked_object_lets_engine_finalize() {
        let mut pair = CoopPair::new(standard_catalog());
        assert_eq!(pair.host_deconstruct(4242), HookDecision::Proceed);
        assert_eq!(pair.client.in_flight(), 0);
    }

    #[test]
    fn test_host_never_applies_host_action_notice() {
        let mut pair = CoopPair::new(standard_catalog());
        let notice = MessageDeconstruct::result(1, vec![], DeconstructOrigin::HostAction);
        let err = pair
            .host
            .session
            .receive(&mut pair.host.world, notice.into())
            .unwrap_err();
        assert!(matches!(err, SyncError::RoleViolation { role: Role::Host, .. }));
    }
}

// =============================================================================
// Failure paths
// =============================================================================

mod failures {
    use super::*;

    #[test]
    fn test_scenario_c_race_leaves_client_stale() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &[], false);

        // both players finish at once; the host's notice is still in flight
        pair.host_deconstruct(target);
        let notice_frames = pair.client.in_flight();
        pair.client_deconstruct(target);

        let results = pair.deliver_to_host();
        assert_eq!(results, vec![Err(SyncError::AlreadyDestroyed(target))]);
        assert_eq!(pair.client.in_flight(), notice_frames, "host must not reply");
        assert!(pair.client.world.is_live(target));
        assert_eq!(pair.client.session.tracker().awaiting_reply().len(), 1);

        // the notice converges the client eventually
        pair.deliver_to_client();
        assert!(!pair.client.world.is_live(target));
        assert_eq!(pair.host.world.double_destroys(), 0);
    }

    #[test]
    fn test_scenario_c_unknown_target_gets_no_reply() {
        let mut pair = CoopPair::new(standard_catalog());
        let stray = WorldObject::new(777, group("Foundation"));
        pair.client.session.register(stray, None).unwrap();

        pair.client_deconstruct(777);
        let results = pair.deliver_to_host();

        assert_eq!(results, vec![Err(SyncError::UnknownWorldObject(777))]);
        assert_eq!(results[0].as_ref().unwrap_err().to_string(), "Unknown WorldObject 777");
        assert_eq!(pair.client.in_flight(), 0);
        assert!(pair.client.session.mirror().contains(777));
        assert_eq!(pair.host.session.stats().warnings, 1);
    }

    #[test]
    fn test_host_drops_request_for_unbound_structure() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &["Panel"], false);
        pair.host.session.mirror_mut().unbind(target);

        pair.client_deconstruct(target);
        let results = pair.deliver_to_host();

        assert_eq!(results, vec![Err(SyncError::UnknownGameObject(target))]);
        assert_eq!(pair.client.in_flight(), 0);
        assert!(pair.host.world.is_live(target));
    }

    #[test]
    fn test_client_applies_refund_for_unbound_structure() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(5, 0, 5), &["Panel"], false);
        let go = pair.client.session.mirror_mut().unbind(target).unwrap();

        pair.client_deconstruct(target);
        pair.pump();

        assert_conserved(&scenario_a_refund(), &pair.client.received_groups());
        assert!(!pair.client.world.is_live(target));
        // visual cleanup skipped for the unbound representation
        assert!(pair.client.world.game_object(go).unwrap().alive);
    }

    #[test]
    fn test_partial_batch_skips_unknown_items() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &[], false);
        let iron = pair
            .client
            .world
            .create_world_object(&group("Iron"), 500)
            .unwrap();
        pair.client.session.register(iron, None).unwrap();

        let reply = MessageDeconstruct::result(
            target,
            vec![900, 500, 901],
            DeconstructOrigin::ClientRequest,
        );
        let outcome = pair.client.session.receive(&mut pair.client.world, reply.into()).unwrap();

        let Received::Deconstruct(DeconstructOutcome::Applied { refunds, skipped, .. }) = outcome
        else {
            panic!("unexpected {outcome:?}");
        };
        assert_eq!(skipped, vec![900, 901]);
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].item, 500);
        assert!(!pair.client.world.is_live(target));
        assert_eq!(pair.client.session.stats().warnings, 2);
    }

    #[test]
    fn test_reply_for_unknown_target_is_rejected() {
        let mut pair = CoopPair::new(standard_catalog());
        let iron = pair
            .client
            .world
            .create_world_object(&group("Iron"), 500)
            .unwrap();
        pair.client.session.register(iron, None).unwrap();

        let reply = MessageDeconstruct::result(31337, vec![500], DeconstructOrigin::ClientRequest);
        let outcome = pair.client.session.receive(&mut pair.client.world, reply.into());

        assert_eq!(outcome, Err(SyncError::UnknownWorldObject(31337)));
        assert!(pair.client.received_groups().is_empty());
        assert!(pair.client.world.notifications().is_empty());
        assert_eq!(pair.client.world.live_object(500).unwrap().container, None);
        assert_eq!(pair.client.session.stats().warnings, 1);
        assert_eq!(pair.client.session.stats().refunds_placed, 0);

        // the item stays creditable by the reply for its real target
        assert!(pair.client.session.mirror().contains(500));
    }

    #[test]
    fn test_host_action_with_unknown_ingredient_changes_nothing() {
        let mut pair = CoopPair::new(catalog_with_missing_ingredient());
        let target = pair.spawn_structure("Foundation", pos(2, 0, 2), &[], false);

        assert_eq!(pair.host_deconstruct(target), HookDecision::Proceed);

        assert!(pair.host.received_groups().is_empty());
        assert_eq!(pair.host.world.inventory(HOST_INVENTORY).unwrap().len(), 0);
        assert_eq!(pair.host.session.tracker().phase(target), None);
        assert_eq!(pair.host.session.mirror().lookup(target).unwrap().position, pos(2, 0, 2));
        assert!(pair.host.session.pending_messages().is_empty());
        assert_eq!(pair.client.in_flight(), 0);
        assert_eq!(pair.host.world.live_count(), 1);
    }

    #[test]
    fn test_request_with_unknown_ingredient_is_refused_whole() {
        let mut pair = CoopPair::new(catalog_with_missing_ingredient());
        let target = pair.spawn_structure("Foundation", pos(2, 0, 2), &[], false);

        pair.client_deconstruct(target);
        let results = pair.deliver_to_host();

        assert_eq!(results, vec![Err(SyncError::UnknownGroup("Gold".to_string()))]);
        assert_eq!(pair.client.in_flight(), 0);
        assert!(pair.host.world.is_live(target));
        assert_eq!(pair.host.session.tracker().phase(target), None);
        assert_eq!(pair.host.world.live_count(), 1);
    }

    #[test]
    fn test_snapshot_with_largest_id_is_mirrored() {
        let mut pair = CoopPair::new(standard_catalog());
        let snapshot = MessageWorldObject::from(&WorldObject::new(u64::MAX, group("Iron")));

        let outcome = pair.client.session.receive(&mut pair.client.world, snapshot.into());

        assert_eq!(
            outcome,
            Ok(Received::WorldObject {
                id: u64::MAX,
                created: true
            })
        );
        assert!(pair.client.session.mirror().contains(u64::MAX));
    }

    #[test]
    fn test_malformed_frame_does_not_end_session() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Panel", pos(0, 0, 0), &[], false);

        let err = pair
            .host
            .session
            .receive_frame(&mut pair.host.world, b"not a frame")
            .unwrap_err();
        assert!(matches!(err, SyncError::MalformedMessage(_)));

        pair.client_deconstruct(target);
        pair.pump();
        assert_eq!(pair.client.received_groups(), vec![group("Iron")]);
    }

    #[test]
    fn test_solo_session_rejects_protocol_messages() {
        let (transport, _peer) = LoopbackTransport::channel();
        let mut solo = Session::new(Role::Solo, SessionConfig::default(), 1, Box::new(transport));
        let mut world = SandboxWorld::new(standard_catalog());

        let err = solo
            .receive(&mut world, MessageDeconstruct::request(1).into())
            .unwrap_err();
        assert!(matches!(err, SyncError::RoleViolation { role: Role::Solo, .. }));
        assert_eq!(solo.stats().warnings, 1);
    }
}

// =============================================================================
// Idempotence
// =============================================================================

mod idempotence {
    use super::*;

    #[test]
    fn test_duplicate_reply_is_noop() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &["Panel"], false);

        pair.client_deconstruct(target);
        pair.pump();
        let before = group_counts(&pair.client.received_groups());

        let again = pair.redeliver_last_to_client().unwrap();

        assert_eq!(again, Err(SyncError::AlreadyDestroyed(target)));
        assert_eq!(group_counts(&pair.client.received_groups()), before);
        assert_eq!(pair.client.world.double_destroys(), 0);
        assert_eq!(pair.client.world.notifications().len(), 4);
    }

    #[test]
    fn test_duplicate_request_is_noop_on_host() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &[], false);

        pair.client_deconstruct(target);
        pair.deliver_to_host();
        let in_flight = pair.client.in_flight();

        let again = pair.redeliver_last_to_host().unwrap();

        assert_eq!(again, Err(SyncError::AlreadyDestroyed(target)));
        assert_eq!(pair.client.in_flight(), in_flight);
        assert_eq!(pair.host.world.double_destroys(), 0);
    }

    #[test]
    fn test_items_are_never_credited_twice() {
        let mut pair = CoopPair::new(standard_catalog());
        let iron = pair
            .client
            .world
            .create_world_object(&group("Iron"), 500)
            .unwrap();
        pair.client.session.register(iron, None).unwrap();

        // two unrelated replies naming the same refund item
        for target in [41, 42] {
            let reply =
                MessageDeconstruct::result(target, vec![500], DeconstructOrigin::ClientRequest);
            pair.client
                .session
                .receive(&mut pair.client.world, reply.into())
                .unwrap();
        }

        assert_eq!(pair.client.received_groups(), vec![group("Iron")]);
        assert_eq!(pair.client.world.notifications().len(), 1);
    }
}

// =============================================================================
// Persistence flag
// =============================================================================

mod persistence {
    use super::*;

    #[test]
    fn test_scene_structure_removal_is_persisted() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &[], true);
        assert!(pair.host.session.mirror().lookup(target).unwrap().dont_save);

        pair.client_deconstruct(target);
        pair.deliver_to_host();

        let destroyed = pair.host.world.destroyed().last().unwrap();
        assert_eq!(destroyed.id, target);
        assert!(!destroyed.dont_save);
    }

    #[test]
    fn test_built_structure_keeps_flag() {
        let mut pair = CoopPair::new(standard_catalog());
        let target = pair.spawn_structure("Foundation", pos(0, 0, 0), &[], false);
        pair.host
            .session
            .mirror_mut()
            .lookup_mut(target)
            .unwrap()
            .dont_save = true;

        pair.client_deconstruct(target);
        pair.deliver_to_host();

        assert!(pair.host.world.destroyed().last().unwrap().dont_save);
    }
}
