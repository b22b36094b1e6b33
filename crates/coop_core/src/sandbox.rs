//! In-memory [`GameWorld`] used by tests and the headless runner.
//!
//! Keeps just enough engine state to observe what the core did: live world
//! objects, inventories, the floor, game object representations and the
//! notifications shown to the player. Destroying an object twice is counted
//! rather than panicking so tests can assert it never happens.

use std::collections::{BTreeMap, HashMap};

use crate::capability::GameWorld;
use crate::error::{Result, SyncError};
use crate::inventory::{Inventory, Notification};
use crate::math::Vec3Fixed;
use crate::world::{
    GameObjectHandle, GroupCatalog, GroupId, InventoryId, WorldObject, WorldObjectId, FRESH_ID,
};

/// Carried inventory of the host player.
pub const HOST_INVENTORY: InventoryId = 1;
/// Carried inventory of the client player.
pub const CLIENT_INVENTORY: InventoryId = 2;

/// Engine-side state of a structure's representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxGameObject {
    /// World position.
    pub position: Vec3Fixed,
    /// Constructible groups of the attached panels, in scan order.
    pub panels: Vec<GroupId>,
    /// Pre-placed by the scene rather than built by a player.
    pub from_scene: bool,
    /// Still present in the engine.
    pub alive: bool,
}

/// Minimal engine world.
#[derive(Debug, Clone)]
pub struct SandboxWorld {
    catalog: GroupCatalog,
    next_id: WorldObjectId,
    live: BTreeMap<WorldObjectId, WorldObject>,
    destroyed: Vec<WorldObject>,
    double_destroys: u32,
    inventories: BTreeMap<InventoryId, Inventory>,
    floor: Vec<(WorldObjectId, Vec3Fixed)>,
    game_objects: HashMap<GameObjectHandle, SandboxGameObject>,
    next_game_object: u64,
    notifications: Vec<Notification>,
    animation_stops: u32,
}

impl SandboxWorld {
    /// First identifier handed out for fresh objects.
    pub const FIRST_ID: WorldObjectId = 100;

    /// Create an empty world over a group catalog.
    #[must_use]
    pub fn new(catalog: GroupCatalog) -> Self {
        Self {
            catalog,
            next_id: Self::FIRST_ID,
            live: BTreeMap::new(),
            destroyed: Vec::new(),
            double_destroys: 0,
            inventories: BTreeMap::new(),
            floor: Vec::new(),
            game_objects: HashMap::new(),
            next_game_object: 1,
            notifications: Vec::new(),
            animation_stops: 0,
        }
    }

    /// Group catalog backing recipe lookups.
    #[must_use]
    pub const fn catalog(&self) -> &GroupCatalog {
        &self.catalog
    }

    /// Add an inventory with a slot capacity.
    pub fn add_inventory(&mut self, id: InventoryId, capacity: usize) {
        self.inventories.insert(id, Inventory::new(id, capacity));
    }

    /// Inventory by id.
    #[must_use]
    pub fn inventory(&self, id: InventoryId) -> Option<&Inventory> {
        self.inventories.get(&id)
    }

    /// Create a structure representation.
    pub fn spawn_game_object(
        &mut self,
        position: Vec3Fixed,
        panels: Vec<GroupId>,
        from_scene: bool,
    ) -> GameObjectHandle {
        let handle = GameObjectHandle(self.next_game_object);
        self.next_game_object += 1;
        self.game_objects.insert(
            handle,
            SandboxGameObject {
                position,
                panels,
                from_scene,
                alive: true,
            },
        );
        handle
    }

    /// Representation state by handle, dead ones included.
    #[must_use]
    pub fn game_object(&self, handle: GameObjectHandle) -> Option<&SandboxGameObject> {
        self.game_objects.get(&handle)
    }

    /// Items lying on the floor, in drop order.
    #[must_use]
    pub fn floor(&self) -> &[(WorldObjectId, Vec3Fixed)] {
        &self.floor
    }

    /// Notifications shown so far, oldest first.
    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Check if a world object exists.
    #[must_use]
    pub fn is_live(&self, id: WorldObjectId) -> bool {
        self.live.contains_key(&id)
    }

    /// Live world object by id.
    #[must_use]
    pub fn live_object(&self, id: WorldObjectId) -> Option<&WorldObject> {
        self.live.get(&id)
    }

    /// Live world objects in id order.
    pub fn live_objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.live.values()
    }

    /// Number of live world objects.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Final state of every destroyed world object, in destruction order.
    #[must_use]
    pub fn destroyed(&self) -> &[WorldObject] {
        &self.destroyed
    }

    /// Destruction calls for objects that were not live.
    #[must_use]
    pub const fn double_destroys(&self) -> u32 {
        self.double_destroys
    }

    /// Times the deconstruction animation was ended.
    #[must_use]
    pub const fn animation_stops(&self) -> u32 {
        self.animation_stops
    }
}

impl GameWorld for SandboxWorld {
    fn create_world_object(
        &mut self,
        group: &GroupId,
        explicit_id: WorldObjectId,
    ) -> Result<WorldObject> {
        if !self.catalog.contains(group) {
            return Err(SyncError::UnknownGroup(group.to_string()));
        }
        let id = if explicit_id == FRESH_ID {
            self.next_id
        } else {
            explicit_id
        };
        if self.live.contains_key(&id) {
            return Err(SyncError::InvalidState(format!("WorldObject {id} already exists")));
        }
        self.next_id = self.next_id.max(id.saturating_add(1));

        let object = WorldObject::new(id, group.clone());
        self.live.insert(id, object.clone());
        Ok(object)
    }

    fn destroy_world_object(&mut self, object: &WorldObject) {
        match self.live.remove(&object.id) {
            Some(_) => {
                if let Some(container) = object.container {
                    if let Some(inventory) = self.inventories.get_mut(&container) {
                        inventory.remove_item(object.id);
                    }
                }
                self.floor.retain(|(id, _)| *id != object.id);
                self.destroyed.push(object.clone());
            }
            None => {
                self.double_destroys += 1;
                tracing::error!(id = object.id, "sandbox: destroying a dead world object");
            }
        }
    }

    fn drop_on_floor(&mut self, object: &mut WorldObject, position: Vec3Fixed) {
        object.position = position;
        object.container = None;
        self.floor.push((object.id, position));
        if let Some(live) = self.live.get_mut(&object.id) {
            *live = object.clone();
        }
    }

    fn add_to_inventory(&mut self, inventory: InventoryId, object: &mut WorldObject) -> bool {
        let Some(target) = self.inventories.get_mut(&inventory) else {
            return false;
        };
        if !target.add_item(object.id) {
            return false;
        }
        object.container = Some(inventory);
        if let Some(live) = self.live.get_mut(&object.id) {
            *live = object.clone();
        }
        true
    }

    fn has_group(&self, group: &GroupId) -> bool {
        self.catalog.contains(group)
    }

    fn recipe_ingredients(&self, group: &GroupId) -> Result<Vec<GroupId>> {
        self.catalog.recipe_ingredients(group)
    }

    fn attached_panels(&self, game_object: GameObjectHandle) -> Vec<GroupId> {
        self.game_objects
            .get(&game_object)
            .filter(|go| go.alive)
            .map(|go| go.panels.clone())
            .unwrap_or_default()
    }

    fn is_scene_object(&self, game_object: GameObjectHandle) -> bool {
        self.game_objects
            .get(&game_object)
            .is_some_and(|go| go.from_scene)
    }

    fn game_object_position(&self, game_object: GameObjectHandle) -> Option<Vec3Fixed> {
        self.game_objects
            .get(&game_object)
            .filter(|go| go.alive)
            .map(|go| go.position)
    }

    fn destroy_game_object(&mut self, game_object: GameObjectHandle) {
        match self.game_objects.get_mut(&game_object) {
            Some(go) if go.alive => go.alive = false,
            _ => tracing::warn!(%game_object, "sandbox: destroying a dead game object"),
        }
    }

    fn show_information(&mut self, notification: &Notification) {
        self.notifications.push(notification.clone());
    }

    fn end_deconstruct_animation(&mut self) {
        self.animation_stops += 1;
    }

    fn group_name(&self, group: &GroupId) -> String {
        self.catalog
            .get(group)
            .map_or_else(|| group.to_string(), |g| g.name.clone())
    }
}
