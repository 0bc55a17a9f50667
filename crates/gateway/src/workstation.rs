//! Static workstation-id → computer-slot lookup (spec §4.F point 2: "a
//! shared lookup table, external to this module, maps `workstationId` to
//! `computerId`").
//!
//! A real deployment's world editor owns the authoritative seat list; this
//! is a small fixed table covering the seat names used by the reconciler's
//! default spawn metadata (spec §4.H).

use presence_domain::model::COMPUTER_SLOTS;

const WORKSTATIONS: &[(&str, usize)] = &[
    ("design-studio", 0),
    ("engineering-desk-1", 1),
    ("engineering-desk-2", 2),
    ("support-desk", 3),
    ("reception", 4),
];

/// Resolves a named workstation to one of the room's computer slots.
/// Unknown ids resolve to `None` — the NPC is seated without a computer.
pub fn resolve_computer_id(workstation_id: &str) -> Option<usize> {
    WORKSTATIONS
        .iter()
        .find(|(id, _)| *id == workstation_id)
        .map(|(_, slot)| *slot)
        .filter(|slot| *slot < COMPUTER_SLOTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_workstation_resolves() {
        assert_eq!(resolve_computer_id("design-studio"), Some(0));
    }

    #[test]
    fn unknown_workstation_is_none() {
        assert_eq!(resolve_computer_id("nonexistent-desk"), None);
    }
}
