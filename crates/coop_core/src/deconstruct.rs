//! Deconstruction protocol: request, authority, refund, apply.
//!
//! Deconstructing a built structure destroys it and refunds its materials.
//! The host is the only process allowed to do either:
//!
//! - **Client** intercepts the finalize event, vetoes the local effect and
//!   sends a [`MessageDeconstruct`] request. The structure stays in place
//!   until the host's result arrives (phase [`DeconstructPhase::Requested`]).
//! - **Host** resolves the target, computes the refund (base recipe first,
//!   then every attached panel's recipe), materializes one world object per
//!   ingredient, replicates each one, sends the populated result and destroys
//!   the structure.
//! - **Client**, on the result, credits every refund item to the local
//!   inventory (or the floor when full) and destroys the structure.
//!
//! Refund items the mirror cannot resolve are logged and skipped; a result
//! whose target cannot be resolved is rejected whole. Applying the
//! same result twice is a no-op: destroyed ids are remembered by the mirror
//! and credited refund items by the session.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::capability::GameWorld;
use crate::error::{Result, SyncError};
use crate::hooks::HookDecision;
use crate::inventory::{resolve_refund_item, RefundPlacement, ResolvedRefund};
use crate::math::Vec3Fixed;
use crate::message::{DeconstructOrigin, MessageDeconstruct, MessageWorldObject};
use crate::mirror::Resolution;
use crate::role::Role;
use crate::session::Session;
use crate::world::{GameObjectHandle, GroupId, InventoryId, WorldObjectId, FRESH_ID};

// ============================================================================
// Phases
// ============================================================================

/// Phase of one in-flight deconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeconstructPhase {
    /// Client sent a request and waits for the host.
    Requested {
        /// Tick the (latest) request went out on.
        since_tick: u64,
    },
    /// Host accepted the destructive action.
    Authorized,
    /// Host materialized and replicated the refund.
    Refunded,
    /// Structure destroyed locally. Terminal.
    Applied,
}

impl DeconstructPhase {
    /// Whether `next` may follow `current` (`None` = not tracked yet).
    #[must_use]
    pub fn can_follow(current: Option<Self>, next: Self) -> bool {
        matches!(
            (current, next),
            (None | Some(Self::Requested { .. }), Self::Requested { .. })
                | (None, Self::Authorized)
                | (Some(Self::Authorized), Self::Refunded)
                | (Some(Self::Refunded), Self::Applied)
                // client applying a result, solicited or not
                | (None | Some(Self::Requested { .. }), Self::Applied)
        )
    }

    /// Check if the structure is gone.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Per-target phase bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct DeconstructionTracker {
    phases: HashMap<WorldObjectId, DeconstructPhase>,
}

impl DeconstructionTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase of a target.
    #[must_use]
    pub fn phase(&self, id: WorldObjectId) -> Option<DeconstructPhase> {
        self.phases.get(&id).copied()
    }

    /// Move a target to its next phase.
    ///
    /// Out-of-order transitions are logged and still recorded; the peer is
    /// authoritative about what actually happened.
    pub fn advance(&mut self, id: WorldObjectId, next: DeconstructPhase) {
        let current = self.phase(id);
        if DeconstructPhase::can_follow(current, next) {
            tracing::debug!(id, ?current, ?next, "deconstruction phase");
        } else {
            tracing::warn!(id, ?current, ?next, "deconstruction phase out of order");
        }
        self.phases.insert(id, next);
    }

    /// Client requests still waiting for the host, oldest first.
    #[must_use]
    pub fn awaiting_reply(&self) -> Vec<(WorldObjectId, u64)> {
        let mut waiting: Vec<_> = self
            .phases
            .iter()
            .filter_map(|(&id, phase)| match phase {
                DeconstructPhase::Requested { since_tick } => Some((id, *since_tick)),
                _ => None,
            })
            .collect();
        waiting.sort_unstable_by_key(|&(id, since)| (since, id));
        waiting
    }

    /// Requests that have been waiting at least `ticks` as of `now`.
    #[must_use]
    pub fn stale(&self, now: u64, ticks: u64) -> Vec<WorldObjectId> {
        self.awaiting_reply()
            .into_iter()
            .filter(|&(_, since)| now.saturating_sub(since) >= ticks)
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of completed deconstructions.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.phases.values().filter(|phase| phase.is_terminal()).count()
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// What a deconstruction handler did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeconstructOutcome {
    /// Client sent a request and now waits.
    Requested {
        /// Target structure.
        target: WorldObjectId,
    },
    /// Host destroyed the target and sent the refund.
    Authorized {
        /// Target structure.
        target: WorldObjectId,
        /// Refund items in creation order.
        item_ids: Vec<WorldObjectId>,
        /// Refund groups, base recipe first then panels.
        groups: Vec<GroupId>,
    },
    /// Client credited the refund and destroyed the target.
    Applied {
        /// Target structure.
        target: WorldObjectId,
        /// Per-item placement of the credited refund.
        refunds: Vec<ResolvedRefund>,
        /// Items skipped because the mirror could not resolve them.
        skipped: Vec<WorldObjectId>,
    },
    /// Client mirrored a deconstruction the host player did.
    Mirrored {
        /// Target structure.
        target: WorldObjectId,
        /// Refund items the mirror could not resolve.
        unresolved: Vec<WorldObjectId>,
    },
}

impl DeconstructOutcome {
    /// Target structure of the outcome.
    #[must_use]
    pub const fn target(&self) -> WorldObjectId {
        match self {
            Self::Requested { target }
            | Self::Authorized { target, .. }
            | Self::Applied { target, .. }
            | Self::Mirrored { target, .. } => *target,
        }
    }
}

// ============================================================================
// Refund computation
// ============================================================================

/// Ingredients refunded for a structure: its base recipe, then the recipe of
/// every attached panel in structural scan order.
///
/// Fails with [`SyncError::UnknownGroup`] if any ingredient cannot be
/// instantiated, so callers can reject the deconstruction before touching
/// any state.
pub fn compute_refund<W: GameWorld + ?Sized>(
    world: &W,
    base: &GroupId,
    game_object: GameObjectHandle,
) -> Result<Vec<GroupId>> {
    let mut ingredients = world.recipe_ingredients(base)?;
    for panel in world.attached_panels(game_object) {
        ingredients.extend(world.recipe_ingredients(&panel)?);
    }
    if let Some(missing) = ingredients.iter().find(|group| !world.has_group(group)) {
        return Err(SyncError::UnknownGroup(missing.to_string()));
    }
    Ok(ingredients)
}

// ============================================================================
// Handlers
// ============================================================================

impl Session {
    /// Before-finalize hook for the deconstruct action.
    ///
    /// - Solo: the engine's default effect runs untouched.
    /// - Client: the default effect is vetoed and a request goes to the host.
    /// - Host: the core performs the authoritative effect itself and vetoes
    ///   the engine's finalize so the structure is destroyed exactly once.
    ///   If the target is not replicated, the engine's default runs.
    pub fn on_deconstruct_finalize<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        target: WorldObjectId,
    ) -> HookDecision {
        match self.role {
            Role::Solo => HookDecision::Proceed,
            Role::Client => {
                if let Err(e) = self.request_deconstruct(world, target) {
                    self.stats.warnings += 1;
                    tracing::warn!("ActionDeconstructible_FinalyDestroy: {e}");
                }
                HookDecision::Veto
            }
            Role::Host => match self.host_deconstruct(world, target) {
                Ok(_) => HookDecision::Veto,
                Err(e) => {
                    self.stats.warnings += 1;
                    tracing::warn!(
                        "ActionDeconstructible_FinalyDestroy: {e}, letting the engine finalize"
                    );
                    HookDecision::Proceed
                }
            },
        }
    }

    /// Ask the host to deconstruct `target`. Client only.
    ///
    /// Local state is untouched until the host's result arrives.
    pub fn request_deconstruct<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        target: WorldObjectId,
    ) -> Result<DeconstructOutcome> {
        self.require_role(Role::Client, "deconstruct request")?;
        world.end_deconstruct_animation();

        let object = self
            .mirror
            .lookup(target)
            .ok_or_else(|| self.unresolved(target))?;
        tracing::info!("ActionDeconstructible_FinalyDestroy: requesting {}", object);

        if let Some(DeconstructPhase::Requested { since_tick }) = self.tracker.phase(target) {
            tracing::debug!(target, since_tick, "re-sending deconstruct request");
        }

        self.send(MessageDeconstruct::request(target));
        self.signal();
        self.tracker.advance(
            target,
            DeconstructPhase::Requested {
                since_tick: self.tick,
            },
        );
        Ok(DeconstructOutcome::Requested { target })
    }

    /// Deconstruct `target` on behalf of the host player. Host only.
    ///
    /// The refund is credited to the host's own inventory and the client is
    /// told about the destruction with a [`DeconstructOrigin::HostAction`]
    /// result.
    pub fn host_deconstruct<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        target: WorldObjectId,
    ) -> Result<DeconstructOutcome> {
        self.require_role(Role::Host, "host deconstruct")?;
        world.end_deconstruct_animation();

        let go = self.bound_game_object(target)?;
        let (base, structure_position) = self
            .mirror
            .lookup(target)
            .map(|object| (object.group.clone(), object.position))
            .ok_or(SyncError::UnknownWorldObject(target))?;
        let groups = compute_refund(world, &base, go)?;
        self.tracker.advance(target, DeconstructPhase::Authorized);

        if let Some(object) = self.mirror.lookup_mut(target) {
            tracing::info!("ActionDeconstructible_FinalyDestroy: {}", object);
            object.reset_position_and_rotation();
        }
        self.replicate(target)?;

        let drop_at = world
            .game_object_position(go)
            .unwrap_or(structure_position)
            + self.config.drop_offset();
        let inventory = self.local_inventory;
        let item_ids = self.materialize_refund(world, &groups, Some((inventory, drop_at)))?;
        self.tracker.advance(target, DeconstructPhase::Refunded);

        tracing::info!(
            target,
            ingredients = groups.len(),
            "host deconstruct: refunded to host inventory"
        );
        self.send(MessageDeconstruct::result(
            target,
            item_ids.clone(),
            DeconstructOrigin::HostAction,
        ));
        self.signal();

        self.destroy_structure(world, target, true);
        self.tracker.advance(target, DeconstructPhase::Applied);

        Ok(DeconstructOutcome::Authorized {
            target,
            item_ids,
            groups,
        })
    }

    /// Handle a [`MessageDeconstruct`] from the peer.
    pub fn receive_deconstruct<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        message: MessageDeconstruct,
    ) -> Result<DeconstructOutcome> {
        match (self.role, message.origin) {
            (Role::Host, DeconstructOrigin::ClientRequest) => {
                self.authorize_request(world, message)
            }
            (Role::Client, DeconstructOrigin::ClientRequest) => self.apply_refund(world, message),
            (Role::Client, DeconstructOrigin::HostAction) => {
                self.mirror_host_action(world, message)
            }
            (role, origin) => Err(SyncError::RoleViolation {
                role,
                message: format!("MessageDeconstruct from {origin:?}"),
            }),
        }
    }

    /// Host side of a client request.
    fn authorize_request<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        message: MessageDeconstruct,
    ) -> Result<DeconstructOutcome> {
        let target = message.id;
        if !message.item_ids.is_empty() {
            tracing::debug!(
                target,
                ignored = message.item_ids.len(),
                "ignoring item ids in a client request"
            );
        }

        let go = self.bound_game_object(target)?;
        let base = self
            .mirror
            .lookup(target)
            .map(|object| object.group.clone())
            .ok_or(SyncError::UnknownWorldObject(target))?;
        let groups = compute_refund(world, &base, go)?;
        self.tracker.advance(target, DeconstructPhase::Authorized);

        let item_ids = self.materialize_refund(world, &groups, None)?;
        self.tracker.advance(target, DeconstructPhase::Refunded);

        if let Some(object) = self.mirror.lookup(target) {
            tracing::info!(
                "ReceiveMessageDeconstruct: Deconstructing {}, Ingredients = {}",
                object,
                groups.len()
            );
        }
        self.send(MessageDeconstruct::result(
            target,
            item_ids.clone(),
            DeconstructOrigin::ClientRequest,
        ));
        self.signal();

        self.destroy_structure(world, target, true);
        self.tracker.advance(target, DeconstructPhase::Applied);

        Ok(DeconstructOutcome::Authorized {
            target,
            item_ids,
            groups,
        })
    }

    /// Client side of the host's result to our own request.
    fn apply_refund<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        message: MessageDeconstruct,
    ) -> Result<DeconstructOutcome> {
        let target = message.id;
        let (structure_position, go) = match self.mirror.resolve(target) {
            Resolution::Bound(object, go) => (object.position, Some(go)),
            Resolution::Unbound(object) => (object.position, None),
            Resolution::Destroyed => return Err(SyncError::AlreadyDestroyed(target)),
            Resolution::Unknown => return Err(SyncError::UnknownWorldObject(target)),
        };

        let base_position = go
            .and_then(|go| world.game_object_position(go))
            .unwrap_or(structure_position);
        let drop_at = base_position + self.config.drop_offset();
        let inventory = self.local_inventory;
        let lifetime_ms = self.config.notification_lifetime_ms;

        let mut refunds = Vec::with_capacity(message.item_ids.len());
        let mut skipped = Vec::new();
        for id in message.item_ids {
            if self.credited.contains(&id) {
                tracing::debug!(id, target, "refund item already credited");
                continue;
            }
            let Some(item) = self.mirror.lookup_mut(id) else {
                self.stats.warnings += 1;
                tracing::warn!(
                    "ReceiveMessageDeconstruct: Refund: Unknown WorldObject {id} of parent {target}"
                );
                skipped.push(id);
                continue;
            };
            let resolved = resolve_refund_item(world, inventory, item, drop_at, lifetime_ms);
            match resolved.placement {
                RefundPlacement::Placed { .. } => self.stats.refunds_placed += 1,
                RefundPlacement::Dropped { .. } => self.stats.refunds_dropped += 1,
            }
            self.credited.insert(id);
            refunds.push(resolved);
        }

        self.destroy_structure(world, target, false);
        self.tracker.advance(target, DeconstructPhase::Applied);

        Ok(DeconstructOutcome::Applied {
            target,
            refunds,
            skipped,
        })
    }

    /// Client side of a deconstruction the host player performed.
    fn mirror_host_action<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        message: MessageDeconstruct,
    ) -> Result<DeconstructOutcome> {
        let target = message.id;
        if let Some(error) = self.mirror.resolve(target).into_error(target) {
            if !matches!(error, SyncError::UnknownGameObject(_)) {
                return Err(error);
            }
        }

        let mut unresolved = Vec::new();
        for id in message.item_ids {
            if !self.mirror.contains(id) {
                self.stats.warnings += 1;
                tracing::warn!(
                    "ReceiveMessageDeconstruct: Refund: Unknown WorldObject {id} of parent {target}"
                );
                unresolved.push(id);
            }
        }

        self.destroy_structure(world, target, false);
        self.tracker.advance(target, DeconstructPhase::Applied);

        Ok(DeconstructOutcome::Mirrored { target, unresolved })
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn require_role(&self, expected: Role, action: &str) -> Result<()> {
        if self.role == expected {
            Ok(())
        } else {
            Err(SyncError::RoleViolation {
                role: self.role,
                message: action.to_string(),
            })
        }
    }

    /// Error for an id that does not resolve to a tracked record.
    fn unresolved(&self, id: WorldObjectId) -> SyncError {
        if self.mirror.is_destroyed(id) {
            SyncError::AlreadyDestroyed(id)
        } else {
            SyncError::UnknownWorldObject(id)
        }
    }

    /// Live representation of a target; the refund scan needs it.
    fn bound_game_object(&self, id: WorldObjectId) -> Result<GameObjectHandle> {
        match self.mirror.resolve(id) {
            Resolution::Bound(_, go) => Ok(go),
            other => Err(other
                .into_error(id)
                .unwrap_or(SyncError::UnknownWorldObject(id))),
        }
    }

    /// Create one world object per refunded group and replicate each before
    /// its id is referenced.
    ///
    /// With `credit_to`, every item is first resolved into that inventory
    /// (or onto the floor) so the snapshot carries its final location.
    fn materialize_refund<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        groups: &[GroupId],
        credit_to: Option<(InventoryId, Vec3Fixed)>,
    ) -> Result<Vec<WorldObjectId>> {
        let lifetime_ms = self.config.notification_lifetime_ms;
        let mut item_ids = Vec::with_capacity(groups.len());
        for group in groups {
            let mut item = world.create_world_object(group, FRESH_ID)?;
            if let Some((inventory, drop_at)) = credit_to {
                let resolved =
                    resolve_refund_item(world, inventory, &mut item, drop_at, lifetime_ms);
                match resolved.placement {
                    RefundPlacement::Placed { .. } => self.stats.refunds_placed += 1,
                    RefundPlacement::Dropped { .. } => self.stats.refunds_dropped += 1,
                }
                self.credited.insert(item.id);
            }
            self.outbound.enqueue(MessageWorldObject::from(&item));
            item_ids.push(item.id);
            self.mirror.track(item);
        }
        Ok(item_ids)
    }

    /// Destroy a structure's world object and its representation, once.
    ///
    /// On the host, structures that came from the pre-placed scene get their
    /// `dont_save` flag cleared first so the removal is persisted.
    fn destroy_structure<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        target: WorldObjectId,
        authoritative: bool,
    ) {
        let go = self.mirror.game_object(target);
        if authoritative {
            if let (Some(go), Some(object)) = (go, self.mirror.lookup_mut(target)) {
                if world.is_scene_object(go) {
                    object.dont_save = false;
                }
            }
        }

        let Some(entry) = self.mirror.forget(target) else {
            tracing::warn!("destroy: WorldObject {target} already gone");
            return;
        };
        world.destroy_world_object(&entry.object);
        match entry.game_object {
            Some(go) => world.destroy_game_object(go),
            None => {
                self.stats.warnings += 1;
                tracing::warn!(
                    "ReceiveMessageDeconstruct: Unknown gameObject for {}, skipping visual cleanup",
                    entry.object
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        use DeconstructPhase::{Applied, Authorized, Refunded, Requested};
        assert!(DeconstructPhase::can_follow(None, Requested { since_tick: 0 }));
        assert!(DeconstructPhase::can_follow(Some(Requested { since_tick: 0 }), Applied));
        assert!(DeconstructPhase::can_follow(None, Authorized));
        assert!(DeconstructPhase::can_follow(Some(Authorized), Refunded));
        assert!(DeconstructPhase::can_follow(Some(Refunded), Applied));

        assert!(!DeconstructPhase::can_follow(Some(Applied), Authorized));
        assert!(!DeconstructPhase::can_follow(Some(Authorized), Applied));
        assert!(!DeconstructPhase::can_follow(None, Refunded));
    }

    #[test]
    fn test_tracker_awaiting_reply_oldest_first() {
        let mut tracker = DeconstructionTracker::new();
        tracker.advance(9, DeconstructPhase::Requested { since_tick: 5 });
        tracker.advance(3, DeconstructPhase::Requested { since_tick: 2 });
        tracker.advance(4, DeconstructPhase::Applied);

        assert_eq!(tracker.awaiting_reply(), vec![(3, 2), (9, 5)]);
        assert_eq!(tracker.stale(6, 3), vec![3]);
        assert_eq!(tracker.applied_count(), 1);
    }

    #[test]
    fn test_tracker_records_out_of_order() {
        let mut tracker = DeconstructionTracker::new();
        tracker.advance(1, DeconstructPhase::Refunded);
        assert_eq!(tracker.phase(1), Some(DeconstructPhase::Refunded));
    }
}
