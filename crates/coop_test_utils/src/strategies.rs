//! Property-based testing strategies.
//!
//! Structures are generated together with their own catalog so every
//! generated recipe is resolvable.

use proptest::collection::vec;
use proptest::prelude::*;

use coop_core::world::{Group, GroupCatalog, GroupId, WorldObjectId};

/// Item groups recipes are drawn from.
pub const ITEM_GROUPS: [&str; 4] = ["Iron", "Carbon", "Cobalt", "Silicon"];

/// Group id of the generated structure.
pub const STRUCTURE_GROUP: &str = "Structure";

/// A randomly shaped structure: a base recipe plus a recipe per panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureShape {
    /// Base recipe, as indices into [`ITEM_GROUPS`].
    pub base: Vec<usize>,
    /// One recipe per attached panel, as indices into [`ITEM_GROUPS`].
    pub panels: Vec<Vec<usize>>,
}

impl StructureShape {
    /// Group id of the `index`-th panel.
    #[must_use]
    pub fn panel_group(index: usize) -> String {
        format!("Panel{index}")
    }

    /// Catalog containing the items, the structure and every panel.
    #[must_use]
    pub fn catalog(&self) -> GroupCatalog {
        let mut catalog =
            GroupCatalog::from_groups(ITEM_GROUPS.iter().map(|name| Group::item(*name, *name)));
        catalog.insert(Group::constructible(STRUCTURE_GROUP, STRUCTURE_GROUP, items(&self.base)));
        for (index, recipe) in self.panels.iter().enumerate() {
            let id = Self::panel_group(index);
            catalog.insert(Group::constructible(id.clone(), id, items(recipe)));
        }
        catalog
    }

    /// Panel group ids in attachment order.
    #[must_use]
    pub fn panel_groups(&self) -> Vec<String> {
        (0..self.panels.len()).map(Self::panel_group).collect()
    }

    /// Every ingredient the structure should refund.
    #[must_use]
    pub fn expected_refund(&self) -> Vec<GroupId> {
        let mut refund = items(&self.base);
        for recipe in &self.panels {
            refund.extend(items(recipe));
        }
        refund
    }
}

fn items(indices: &[usize]) -> Vec<GroupId> {
    indices.iter().map(|&i| GroupId::new(ITEM_GROUPS[i])).collect()
}

/// Strategy for a recipe of up to `max` ingredients.
pub fn recipe(max: usize) -> impl Strategy<Value = Vec<usize>> {
    vec(0..ITEM_GROUPS.len(), 0..=max)
}

/// Strategy for a structure with up to four panels.
pub fn structure_shape() -> impl Strategy<Value = StructureShape> {
    (recipe(6), vec(recipe(3), 0..=4)).prop_map(|(base, panels)| StructureShape { base, panels })
}

/// Strategy for identifiers that were never handed out by a sandbox world.
pub fn foreign_ids() -> impl Strategy<Value = Vec<WorldObjectId>> {
    vec(1_000_000u64..2_000_000, 0..8)
}
