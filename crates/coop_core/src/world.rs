//! World object and group definitions.
//!
//! A [`WorldObject`] is the persistent logical entity both processes agree
//! on by identifier. A [`Group`] is its immutable type; constructible groups
//! carry a [`Recipe`] whose ingredients are refunded on deconstruction.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::math::Vec3Fixed;

/// Unique identifier for world objects, shared by host and client.
pub type WorldObjectId = u64;

/// Passing this as an explicit id asks the world to assign a fresh one.
pub const FRESH_ID: WorldObjectId = 0;

/// Identifier of an inventory (player backpack or machine container).
pub type InventoryId = u64;

/// Process-local handle to the engine representation of a world object.
///
/// Never transmitted; only meaningful inside the process that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameObjectHandle(pub u64);

impl fmt::Display for GameObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "go:{}", self.0)
    }
}

// ============================================================================
// Groups and Recipes
// ============================================================================

/// Identifier of a group (object type), e.g. `"Iron"` or `"Foundation"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    /// Create a new group identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Ordered multiset of ingredient groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Ingredients in recipe order. Repeats express quantity.
    pub ingredients: Vec<GroupId>,
}

impl Recipe {
    /// Create a recipe from ingredient groups.
    #[must_use]
    pub fn new(ingredients: impl IntoIterator<Item = GroupId>) -> Self {
        Self {
            ingredients: ingredients.into_iter().collect(),
        }
    }

    /// Ingredient groups in recipe order.
    #[must_use]
    pub fn ingredient_groups(&self) -> &[GroupId] {
        &self.ingredients
    }
}

/// Immutable type definition for world objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique group identifier.
    pub id: GroupId,
    /// Human readable name shown in notifications.
    pub name: String,
    /// Recipe, present only for constructible groups.
    #[serde(default)]
    pub recipe: Option<Recipe>,
}

impl Group {
    /// A plain item group with no recipe.
    #[must_use]
    pub fn item(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(id),
            name: name.into(),
            recipe: None,
        }
    }

    /// A constructible group built from the given ingredients.
    #[must_use]
    pub fn constructible(
        id: impl Into<String>,
        name: impl Into<String>,
        ingredients: impl IntoIterator<Item = GroupId>,
    ) -> Self {
        Self {
            id: GroupId::new(id),
            name: name.into(),
            recipe: Some(Recipe::new(ingredients)),
        }
    }

    /// Whether this group can be built (and therefore refunded).
    #[must_use]
    pub const fn is_constructible(&self) -> bool {
        self.recipe.is_some()
    }
}

/// Catalog of all known groups.
#[derive(Debug, Clone, Default)]
pub struct GroupCatalog {
    groups: BTreeMap<GroupId, Group>,
}

impl GroupCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a list of groups. Later duplicates win.
    #[must_use]
    pub fn from_groups(groups: impl IntoIterator<Item = Group>) -> Self {
        let mut catalog = Self::new();
        for group in groups {
            catalog.insert(group);
        }
        catalog
    }

    /// Insert or replace a group definition.
    pub fn insert(&mut self, group: Group) {
        self.groups.insert(group.id.clone(), group);
    }

    /// Look up a group.
    #[must_use]
    pub fn get(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    /// Check whether a group is defined.
    #[must_use]
    pub fn contains(&self, id: &GroupId) -> bool {
        self.groups.contains_key(id)
    }

    /// Number of defined groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Recipe ingredients of a group, in recipe order.
    ///
    /// Non-constructible groups have no ingredients.
    pub fn recipe_ingredients(&self, id: &GroupId) -> Result<Vec<GroupId>> {
        let group = self
            .get(id)
            .ok_or_else(|| SyncError::UnknownGroup(id.to_string()))?;
        Ok(group
            .recipe
            .as_ref()
            .map(|recipe| recipe.ingredient_groups().to_vec())
            .unwrap_or_default())
    }
}

// ============================================================================
// World Objects
// ============================================================================

/// A persistent game entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldObject {
    /// Globally unique identifier, never reused while known to either process.
    pub id: WorldObjectId,
    /// Type of this object.
    pub group: GroupId,
    /// World position.
    pub position: Vec3Fixed,
    /// Euler rotation.
    pub rotation: Vec3Fixed,
    /// When set, the object is skipped by save files.
    pub dont_save: bool,
    /// Inventory currently holding this object, if any.
    pub container: Option<InventoryId>,
}

impl WorldObject {
    /// Create a world object at the origin.
    #[must_use]
    pub fn new(id: WorldObjectId, group: GroupId) -> Self {
        Self {
            id,
            group,
            position: Vec3Fixed::ZERO,
            rotation: Vec3Fixed::ZERO,
            dont_save: false,
            container: None,
        }
    }

    /// Builder-style position override.
    #[must_use]
    pub fn at(mut self, position: Vec3Fixed) -> Self {
        self.position = position;
        self
    }

    /// Clear position and rotation, as done before a structure is torn down.
    pub fn reset_position_and_rotation(&mut self) {
        self.position = Vec3Fixed::ZERO;
        self.rotation = Vec3Fixed::ZERO;
    }

    /// Whether the object is placed in the world rather than held somewhere.
    #[must_use]
    pub const fn is_placed(&self) -> bool {
        self.container.is_none()
    }
}

impl fmt::Display for WorldObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} @ {}", self.id, self.group, self.position)?;
        if let Some(container) = self.container {
            write!(f, " in inv:{container}")?;
        }
        Ok(())
    }
}
