//! Capability interface the core needs from the surrounding game engine.
//!
//! The engine implements [`GameWorld`] once and passes it into every
//! handler call. Nothing in the core reaches into engine state any other
//! way. [`CAPABILITY_VERSION`] is bumped whenever a method is added or its
//! contract changes; sessions refuse engines reporting another version.

use crate::error::Result;
use crate::inventory::Notification;
use crate::math::Vec3Fixed;
use crate::world::{GameObjectHandle, GroupId, InventoryId, WorldObject, WorldObjectId};

/// Version of the [`GameWorld`] contract implemented by this crate.
pub const CAPABILITY_VERSION: u32 = 2;

/// Engine services consumed by the replication core.
///
/// All methods run synchronously on the simulation thread.
pub trait GameWorld {
    /// Version of the contract this engine implements.
    fn capability_version(&self) -> u32 {
        CAPABILITY_VERSION
    }

    /// Instantiate a world object of `group`.
    ///
    /// An `explicit_id` of [`FRESH_ID`](crate::world::FRESH_ID) assigns a new
    /// identifier; any other value is used as-is (client side mirroring).
    fn create_world_object(
        &mut self,
        group: &GroupId,
        explicit_id: WorldObjectId,
    ) -> Result<WorldObject>;

    /// Destroy a world object.
    ///
    /// Not idempotent: the core guarantees a single call per identifier.
    fn destroy_world_object(&mut self, object: &WorldObject);

    /// Place an object on the floor at `position`.
    fn drop_on_floor(&mut self, object: &mut WorldObject, position: Vec3Fixed);

    /// Try to add an object to an inventory. `false` when it does not fit.
    fn add_to_inventory(&mut self, inventory: InventoryId, object: &mut WorldObject) -> bool;

    /// Whether `group` can be instantiated.
    fn has_group(&self, group: &GroupId) -> bool;

    /// Recipe ingredients of a group, in recipe order.
    fn recipe_ingredients(&self, group: &GroupId) -> Result<Vec<GroupId>>;

    /// Constructible groups of the panels attached to a structure, in the
    /// order the structural component scan yields them.
    fn attached_panels(&self, game_object: GameObjectHandle) -> Vec<GroupId>;

    /// Whether the representation came from a pre-placed scene object.
    fn is_scene_object(&self, game_object: GameObjectHandle) -> bool;

    /// Current position of the representation.
    fn game_object_position(&self, game_object: GameObjectHandle) -> Option<Vec3Fixed>;

    /// Destroy the engine representation.
    fn destroy_game_object(&mut self, game_object: GameObjectHandle);

    /// Surface a transient notification to the local player.
    fn show_information(&mut self, notification: &Notification);

    /// Stop the local player's deconstruction animation.
    fn end_deconstruct_animation(&mut self);

    /// Display name of a group.
    fn group_name(&self, group: &GroupId) -> String {
        group.to_string()
    }
}
