//! Lifecycle mailbox drain & apply: session/zone teardown operations
//! marshaled onto the tick thread and applied as a pre-tick hook.

use warden_core::lifecycle::LifecycleOp;
use warden_core::traits::{PhaseHook, TickContext};

use crate::combat::DeliveryGuard;
use crate::mailbox::{BoundedMailbox, MailboxItem};
use crate::registry::EntityRegistry;
use crate::session_index::ActiveSessionIndex;

impl MailboxItem for LifecycleOp {
    fn estimated_bytes(&self) -> usize {
        self.estimated_bytes()
    }
}

/// Mailbox carrying lifecycle teardown operations onto the tick
/// thread.
pub type LifecycleMailbox = BoundedMailbox<LifecycleOp>;

/// Pre-tick hook draining the lifecycle mailbox and applying each
/// operation against the session index, entity registry, and
/// per-client delivery guards.
pub struct LifecycleApplier {
    mailbox: std::sync::Arc<LifecycleMailbox>,
    sessions: std::sync::Arc<ActiveSessionIndex>,
    registry: std::sync::Arc<EntityRegistry>,
    guard: std::sync::Arc<DeliveryGuard>,
}

impl LifecycleApplier {
    /// Build an applier wired to the state it tears down.
    pub fn new(
        mailbox: std::sync::Arc<LifecycleMailbox>,
        sessions: std::sync::Arc<ActiveSessionIndex>,
        registry: std::sync::Arc<EntityRegistry>,
        guard: std::sync::Arc<DeliveryGuard>,
    ) -> Self {
        Self {
            mailbox,
            sessions,
            registry,
            guard,
        }
    }

    /// Drain and apply every queued lifecycle operation.
    pub fn apply(&self) {
        let sessions = &self.sessions;
        let registry = &self.registry;
        let guard = &self.guard;
        self.mailbox.drain(|op| match op {
            LifecycleOp::DisconnectSession(session) => {
                sessions.remove(session);
                guard.release_client(session);
            }
            LifecycleOp::UnregisterSession(session) => {
                sessions.remove(session);
                guard.release_client(session);
            }
            LifecycleOp::ClearVisibility(_zone) => {}
            LifecycleOp::CleanupReplication(zone) => {
                registry.despawn_zone(zone);
            }
        });
    }
}

impl PhaseHook for LifecycleApplier {
    fn name(&self) -> &str {
        "lifecycle-applier"
    }

    fn on_pre_tick(
        &mut self,
        _ctx: &mut dyn TickContext,
        _eligible: &[warden_core::id::EntityHandle],
    ) -> Result<(), warden_core::error::InvariantViolation> {
        self.apply();
        Ok(())
    }

    fn on_post_tick(
        &mut self,
        _ctx: &mut dyn TickContext,
        _eligible: &[warden_core::id::EntityHandle],
    ) -> Result<(), warden_core::error::InvariantViolation> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::id::{EntityHandle, SessionId, ZoneId};

    fn setup() -> (
        std::sync::Arc<LifecycleMailbox>,
        LifecycleApplier,
        std::sync::Arc<ActiveSessionIndex>,
        std::sync::Arc<EntityRegistry>,
    ) {
        let mailbox: std::sync::Arc<LifecycleMailbox> =
            std::sync::Arc::new(BoundedMailbox::new(16, usize::MAX));
        let sessions = std::sync::Arc::new(ActiveSessionIndex::new());
        let registry = std::sync::Arc::new(EntityRegistry::new());
        let guard = std::sync::Arc::new(DeliveryGuard::new(16));
        let applier = LifecycleApplier::new(
            mailbox.clone(),
            sessions.clone(),
            registry.clone(),
            guard,
        );
        (mailbox, applier, sessions, registry)
    }

    #[test]
    fn disconnect_session_removes_from_index() {
        let (mailbox, applier, sessions, _registry) = setup();
        sessions.insert(SessionId(1));
        mailbox
            .try_enqueue(LifecycleOp::DisconnectSession(SessionId(1)))
            .unwrap();
        applier.apply();
        assert!(!sessions.contains(SessionId(1)));
    }

    #[test]
    fn cleanup_replication_despawns_zone() {
        let (mailbox, applier, _sessions, registry) = setup();
        registry.register(EntityHandle(1), ZoneId(9));
        mailbox
            .try_enqueue(LifecycleOp::CleanupReplication(ZoneId(9)))
            .unwrap();
        applier.apply();
        assert!(registry.is_empty());
    }
}
