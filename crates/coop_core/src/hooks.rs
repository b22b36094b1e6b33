//! Before-action hooks: interception points into engine actions.
//!
//! The engine calls [`HookRegistry::dispatch_before`] right before it would
//! execute an action's default effect. Any hook may veto that effect; the
//! core then takes responsibility for the action (or defers it to the host).

use std::fmt;

use crate::capability::GameWorld;
use crate::session::Session;
use crate::world::WorldObjectId;

/// An engine action about to run its default effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionEvent {
    /// The local player finished deconstructing a structure.
    DeconstructFinalize {
        /// The structure being deconstructed.
        target: WorldObjectId,
    },
}

/// Whether the engine's default effect should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookDecision {
    /// Run the default effect.
    #[default]
    Proceed,
    /// Skip the default effect.
    Veto,
}

impl HookDecision {
    /// Check if the default effect is skipped.
    #[must_use]
    pub const fn is_veto(self) -> bool {
        matches!(self, Self::Veto)
    }
}

/// Signature of a before-action hook.
pub type BeforeActionHook<W> = fn(&mut Session, &mut W, &ActionEvent) -> HookDecision;

/// Ordered list of named before-action hooks.
pub struct HookRegistry<W: GameWorld + ?Sized> {
    before: Vec<(&'static str, BeforeActionHook<W>)>,
}

impl<W: GameWorld + ?Sized> fmt::Debug for HookRegistry<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.before.iter().map(|(name, _)| *name).collect();
        f.debug_struct("HookRegistry").field("before", &names).finish()
    }
}

impl<W: GameWorld + ?Sized> Default for HookRegistry<W> {
    fn default() -> Self {
        Self { before: Vec::new() }
    }
}

impl<W: GameWorld + ?Sized> HookRegistry<W> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the core's own hooks installed.
    #[must_use]
    pub fn with_core_hooks() -> Self {
        let mut registry = Self::new();
        register_core_hooks(&mut registry);
        registry
    }

    /// Append a hook. Hooks run in registration order.
    pub fn register_before(&mut self, name: &'static str, hook: BeforeActionHook<W>) {
        tracing::debug!(hook = name, "registered before-action hook");
        self.before.push((name, hook));
    }

    /// Run every hook for `event`. A single veto skips the default effect.
    pub fn dispatch_before(
        &self,
        session: &mut Session,
        world: &mut W,
        event: &ActionEvent,
    ) -> HookDecision {
        let mut decision = HookDecision::Proceed;
        for (name, hook) in &self.before {
            if hook(session, world, event).is_veto() {
                tracing::debug!(hook = *name, ?event, "default effect vetoed");
                decision = HookDecision::Veto;
            }
        }
        decision
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.before.len()
    }

    /// Check if no hook is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty()
    }
}

/// Install the deconstruction interception hook.
pub fn register_core_hooks<W: GameWorld + ?Sized>(registry: &mut HookRegistry<W>) {
    registry.register_before("deconstruct_finalize", deconstruct_finalize::<W>);
}

fn deconstruct_finalize<W: GameWorld + ?Sized>(
    session: &mut Session,
    world: &mut W,
    event: &ActionEvent,
) -> HookDecision {
    match *event {
        ActionEvent::DeconstructFinalize { target } => {
            session.on_deconstruct_finalize(world, target)
        }
    }
}
