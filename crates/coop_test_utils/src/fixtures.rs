//! Test fixtures and helpers.
//!
//! A small recipe catalog shared by unit, integration and headless tests.

use std::collections::BTreeMap;

use coop_core::math::{Fixed, Vec3Fixed};
use coop_core::world::{Group, GroupCatalog, GroupId};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a position from integer coordinates.
#[must_use]
pub fn pos(x: i32, y: i32, z: i32) -> Vec3Fixed {
    Vec3Fixed::from_ints(x, y, z)
}

/// Shorthand for a group id.
#[must_use]
pub fn group(id: &str) -> GroupId {
    GroupId::new(id)
}

/// Catalog used across the test suite.
///
/// - `Foundation` = Iron, Iron, Carbon
/// - `Panel` = Iron
/// - `WindowPanel` = Glass, Iron
/// - `Rock` is an item, not constructible
#[must_use]
pub fn standard_catalog() -> GroupCatalog {
    GroupCatalog::from_groups([
        Group::item("Iron", "Iron"),
        Group::item("Carbon", "Carbon"),
        Group::item("Glass", "Glass"),
        Group::item("Rock", "Rock"),
        Group::constructible(
            "Foundation",
            "Foundation",
            [group("Iron"), group("Iron"), group("Carbon")],
        ),
        Group::constructible("Panel", "Wall Panel", [group("Iron")]),
        Group::constructible("WindowPanel", "Window Panel", [group("Glass"), group("Iron")]),
    ])
}

/// Count groups into a multiset.
pub fn group_counts<'a>(groups: impl IntoIterator<Item = &'a GroupId>) -> BTreeMap<GroupId, usize> {
    let mut counts = BTreeMap::new();
    for group in groups {
        *counts.entry(group.clone()).or_insert(0) += 1;
    }
    counts
}

/// Expected refund of a structure: base recipe, then every panel's recipe.
///
/// # Panics
///
/// Panics if a group is missing from the catalog.
#[must_use]
pub fn expected_refund(catalog: &GroupCatalog, base: &GroupId, panels: &[GroupId]) -> Vec<GroupId> {
    let mut refund = catalog.recipe_ingredients(base).expect("base group in catalog");
    for panel in panels {
        refund.extend(catalog.recipe_ingredients(panel).expect("panel group in catalog"));
    }
    refund
}
