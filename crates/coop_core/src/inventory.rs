//! Inventories and refund placement.
//!
//! Refunded items go into the player's carried inventory when there is room
//! and onto the floor otherwise. The floor has no capacity limit, so an item
//! is never lost: exactly one of the two outcomes happens per item.

use serde::{Deserialize, Serialize};

use crate::capability::GameWorld;
use crate::math::Vec3Fixed;
use crate::world::{GroupId, InventoryId, WorldObject, WorldObjectId};

/// How long refund notifications stay on screen, in milliseconds.
pub const DEFAULT_NOTIFICATION_LIFETIME_MS: u32 = 2500;

// ============================================================================
// Inventory
// ============================================================================

/// An ordered, size-bounded container of world objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Inventory identifier.
    pub id: InventoryId,
    /// Maximum number of items.
    capacity: usize,
    /// Items in insertion order.
    items: Vec<WorldObjectId>,
}

impl Inventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new(id: InventoryId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            items: Vec::with_capacity(capacity),
        }
    }

    /// Maximum number of items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the inventory holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remaining free slots.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.items.len())
    }

    /// Check if no more items fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free_slots() == 0
    }

    /// Check if the inventory holds an item.
    #[must_use]
    pub fn contains(&self, id: WorldObjectId) -> bool {
        self.items.contains(&id)
    }

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[WorldObjectId] {
        &self.items
    }

    /// Add an item. Returns `false` when full or already present.
    pub fn add_item(&mut self, id: WorldObjectId) -> bool {
        if self.is_full() || self.contains(id) {
            return false;
        }
        self.items.push(id);
        true
    }

    /// Remove an item. Returns `false` if it was not held.
    pub fn remove_item(&mut self, id: WorldObjectId) -> bool {
        match self.items.iter().position(|&held| held == id) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Kind of information popup raised for a refunded item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InformationKind {
    /// The item went into the inventory.
    InInventory,
    /// The inventory was full and the item was dropped on the floor.
    DropOnFloor,
}

/// A transient notification surfaced to the local player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened to the item.
    pub kind: InformationKind,
    /// Display name of the item's group.
    pub label: String,
    /// Group of the item, for the icon.
    pub group: GroupId,
    /// Display duration in milliseconds.
    pub lifetime_ms: u32,
}

// ============================================================================
// Refund Resolution
// ============================================================================

/// Where a refunded item ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundPlacement {
    /// Added to the inventory.
    Placed {
        /// Receiving inventory.
        inventory: InventoryId,
    },
    /// Dropped on the floor.
    Dropped {
        /// Floor position.
        position: Vec3Fixed,
    },
}

impl RefundPlacement {
    /// Check if the item landed in an inventory.
    #[must_use]
    pub const fn is_placed(&self) -> bool {
        matches!(self, Self::Placed { .. })
    }

    /// Notification kind matching this placement.
    #[must_use]
    pub const fn information_kind(&self) -> InformationKind {
        match self {
            Self::Placed { .. } => InformationKind::InInventory,
            Self::Dropped { .. } => InformationKind::DropOnFloor,
        }
    }
}

/// Outcome of resolving one refunded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRefund {
    /// The refunded item.
    pub item: WorldObjectId,
    /// Where it went.
    pub placement: RefundPlacement,
    /// Notification shown for it.
    pub notification: Notification,
}

/// Put a refunded item into `inventory`, or on the floor at `drop_at` if full.
///
/// Surfaces exactly one notification through the world.
pub fn resolve_refund_item<W: GameWorld + ?Sized>(
    world: &mut W,
    inventory: InventoryId,
    item: &mut WorldObject,
    drop_at: Vec3Fixed,
    lifetime_ms: u32,
) -> ResolvedRefund {
    let placement = if world.add_to_inventory(inventory, item) {
        RefundPlacement::Placed { inventory }
    } else {
        world.drop_on_floor(item, drop_at);
        RefundPlacement::Dropped { position: drop_at }
    };

    let notification = Notification {
        kind: placement.information_kind(),
        label: world.group_name(&item.group),
        group: item.group.clone(),
        lifetime_ms,
    };
    world.show_information(&notification);

    tracing::debug!(item = item.id, group = %item.group, ?placement, "refund resolved");

    ResolvedRefund {
        item: item.id,
        placement,
        notification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxWorld;
    use crate::world::{Group, GroupCatalog, FRESH_ID};

    const BACKPACK: InventoryId = 1;

    fn world_with_capacity(capacity: usize) -> SandboxWorld {
        let catalog = GroupCatalog::from_groups([Group::item("Iron", "Iron Ore")]);
        let mut world = SandboxWorld::new(catalog);
        world.add_inventory(BACKPACK, capacity);
        world
    }

    #[test]
    fn test_inventory_capacity_bound() {
        let mut inv = Inventory::new(1, 2);
        assert!(inv.add_item(10));
        assert!(inv.add_item(11));
        assert!(inv.is_full());
        assert!(!inv.add_item(12));
        assert_eq!(inv.len(), 2);
        assert!(inv.len() <= inv.capacity());
    }

    #[test]
    fn test_inventory_rejects_duplicate() {
        let mut inv = Inventory::new(1, 5);
        assert!(inv.add_item(10));
        assert!(!inv.add_item(10));
        assert_eq!(inv.items(), &[10]);
    }

    #[test]
    fn test_inventory_remove() {
        let mut inv = Inventory::new(1, 5);
        inv.add_item(10);
        inv.add_item(11);
        assert!(inv.remove_item(10));
        assert!(!inv.remove_item(10));
        assert_eq!(inv.items(), &[11]);
    }

    #[test]
    fn test_resolve_places_when_room() {
        let mut world = world_with_capacity(4);
        let mut item = world
            .create_world_object(&GroupId::new("Iron"), FRESH_ID)
            .unwrap();

        let resolved = resolve_refund_item(
            &mut world,
            BACKPACK,
            &mut item,
            Vec3Fixed::up(),
            DEFAULT_NOTIFICATION_LIFETIME_MS,
        );

        assert_eq!(resolved.placement, RefundPlacement::Placed { inventory: BACKPACK });
        assert_eq!(resolved.notification.kind, InformationKind::InInventory);
        assert_eq!(resolved.notification.label, "Iron Ore");
        assert_eq!(item.container, Some(BACKPACK));
        assert!(world.floor().is_empty());
        assert_eq!(world.notifications().len(), 1);
    }

    #[test]
    fn test_resolve_drops_when_full() {
        let mut world = world_with_capacity(0);
        let mut item = world
            .create_world_object(&GroupId::new("Iron"), FRESH_ID)
            .unwrap();
        let drop_at = Vec3Fixed::from_ints(5, 1, 5);

        let resolved = resolve_refund_item(
            &mut world,
            BACKPACK,
            &mut item,
            drop_at,
            DEFAULT_NOTIFICATION_LIFETIME_MS,
        );

        assert_eq!(resolved.placement, RefundPlacement::Dropped { position: drop_at });
        assert_eq!(resolved.notification.kind, InformationKind::DropOnFloor);
        assert_eq!(item.position, drop_at);
        assert_eq!(item.container, None);
        assert_eq!(world.floor(), &[(item.id, drop_at)]);
        assert!(world.inventory(BACKPACK).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_unknown_inventory_falls_back_to_floor() {
        let mut world = world_with_capacity(3);
        let mut item = world
            .create_world_object(&GroupId::new("Iron"), FRESH_ID)
            .unwrap();

        let resolved = resolve_refund_item(&mut world, 99, &mut item, Vec3Fixed::ZERO, 100);

        assert!(!resolved.placement.is_placed());
        assert_eq!(resolved.notification.lifetime_ms, 100);
    }
}
