use rustc_hash::FxHashMap;

use crate::broker::entity_table::EntityId;
use crate::protocol::{BindingId, Refusal};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReservationState {
    Reserved,
    Freed,
}

/// An admitted resource grant for one binding. The granted quantum never exceeds the
///  requested one; with all-or-nothing admission the two are equal while reserved.
#[derive(Debug, Clone, PartialEq)]
pub struct TcConfig {
    pub binding: BindingId,
    pub entity: EntityId,
    pub requested: u32,
    pub granted: u32,
    pub state: ReservationState,
}

/// Admission control over the per-entity capacity budget.
///
/// The rule is all-or-nothing: a request is granted in full iff the grants already
///  held on the same entity leave room for it, and an existing grant is never
///  preempted to make room for a new one. All mutation goes through the one
///  exclusive borrow of this engine, so two admissions can never decide on the same
///  stale usage figure.
pub struct ReservationEngine {
    reservations: FxHashMap<BindingId, TcConfig>,
    granted_by_entity: FxHashMap<EntityId, u64>,
}

impl ReservationEngine {
    pub fn new() -> ReservationEngine {
        ReservationEngine {
            reservations: Default::default(),
            granted_by_entity: Default::default(),
        }
    }

    pub fn reserve(&mut self, binding: BindingId, entity: EntityId, capacity: u32, requested: u32) -> Result<u32, Refusal> {
        if self.reservations.contains_key(&binding) {
            return Err(Refusal::AlreadyReserved);
        }

        let used = self.granted_on(entity);
        if used + requested as u64 > capacity as u64 {
            return Err(Refusal::InsufficientCapacity);
        }

        self.reservations.insert(binding, TcConfig {
            binding,
            entity,
            requested,
            granted: requested,
            state: ReservationState::Reserved,
        });
        *self.granted_by_entity.entry(entity).or_insert(0) += requested as u64;
        Ok(requested)
    }

    /// Re-runs admission with the binding's own grant taken out of the usage figure.
    ///  On refusal the existing grant stays exactly as it was.
    pub fn modify(&mut self, binding: BindingId, capacity: u32, requested: u32) -> Result<u32, Refusal> {
        let current = self.reservations.get(&binding).ok_or(Refusal::UnknownReservation)?;
        let entity = current.entity;

        let used_without_own = self.granted_on(entity) - current.granted as u64;
        if used_without_own + requested as u64 > capacity as u64 {
            return Err(Refusal::InsufficientCapacity);
        }

        let old_granted = current.granted;
        if let Some(config) = self.reservations.get_mut(&binding) {
            config.requested = requested;
            config.granted = requested;
        }
        let entity_sum = self.granted_by_entity.entry(entity).or_insert(0);
        *entity_sum = *entity_sum - old_granted as u64 + requested as u64;
        Ok(requested)
    }

    pub fn free(&mut self, binding: BindingId) -> Result<TcConfig, Refusal> {
        self.free_if_present(binding).ok_or(Refusal::UnknownReservation)
    }

    /// Idempotent variant used by cascading teardown: freeing a binding without a
    ///  reservation is a no-op.
    pub fn free_if_present(&mut self, binding: BindingId) -> Option<TcConfig> {
        let mut config = self.reservations.remove(&binding)?;

        if let Some(entity_sum) = self.granted_by_entity.get_mut(&config.entity) {
            *entity_sum = entity_sum.saturating_sub(config.granted as u64);
            if *entity_sum == 0 {
                self.granted_by_entity.remove(&config.entity);
            }
        }

        config.state = ReservationState::Freed;
        config.granted = 0;
        Some(config)
    }

    /// Sum of the quanta currently granted on this entity.
    pub fn granted_on(&self, entity: EntityId) -> u64 {
        self.granted_by_entity.get(&entity).copied().unwrap_or(0)
    }

    pub fn reservation(&self, binding: BindingId) -> Option<&TcConfig> {
        self.reservations.get(&binding)
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    const E: EntityId = EntityId(1);
    const CAPACITY: u32 = 100;

    fn engine() -> ReservationEngine {
        ReservationEngine::new()
    }

    #[test]
    fn test_admission_scenario() {
        let mut engine = engine();
        let a = BindingId(1);
        let b = BindingId(2);

        assert_eq!(engine.reserve(a, E, CAPACITY, 60), Ok(60));
        assert_eq!(engine.reserve(b, E, CAPACITY, 50), Err(Refusal::InsufficientCapacity));
        assert_eq!(engine.reserve(b, E, CAPACITY, 40), Ok(40));

        // growing A past the remaining headroom leaves its grant untouched
        assert_eq!(engine.modify(a, CAPACITY, 70), Err(Refusal::InsufficientCapacity));
        assert_eq!(engine.reservation(a).unwrap().granted, 60);
        assert_eq!(engine.granted_on(E), 100);
    }

    #[test]
    fn test_free_returns_capacity_exactly() {
        let mut engine = engine();
        let before = engine.granted_on(E);

        engine.reserve(BindingId(1), E, CAPACITY, 73).unwrap();
        assert_eq!(engine.granted_on(E), before + 73);

        let freed = engine.free(BindingId(1)).unwrap();
        assert_eq!(freed.state, ReservationState::Freed);
        assert_eq!(engine.granted_on(E), before);

        assert_eq!(engine.free(BindingId(1)), Err(Refusal::UnknownReservation));
        assert!(engine.free_if_present(BindingId(1)).is_none());
    }

    #[test]
    fn test_double_reserve_same_binding() {
        let mut engine = engine();
        engine.reserve(BindingId(1), E, CAPACITY, 10).unwrap();
        assert_eq!(engine.reserve(BindingId(1), E, CAPACITY, 10), Err(Refusal::AlreadyReserved));
        // the failed attempt must not have double-counted
        assert_eq!(engine.granted_on(E), 10);
    }

    #[test]
    fn test_modify_shrink_always_succeeds() {
        let mut engine = engine();
        engine.reserve(BindingId(1), E, CAPACITY, 90).unwrap();
        engine.reserve(BindingId(2), E, CAPACITY, 10).unwrap();

        assert_eq!(engine.modify(BindingId(1), CAPACITY, 30), Ok(30));
        assert_eq!(engine.granted_on(E), 40);

        // the freed headroom is immediately available to others
        assert_eq!(engine.modify(BindingId(2), CAPACITY, 70), Ok(70));
    }

    #[test]
    fn test_modify_unknown_reservation() {
        let mut engine = engine();
        assert_eq!(engine.modify(BindingId(1), CAPACITY, 10), Err(Refusal::UnknownReservation));
    }

    #[rstest]
    #[case::exact_fit(100, Ok(100))]
    #[case::one_over(101, Err(Refusal::InsufficientCapacity))]
    #[case::zero(0, Ok(0))]
    fn test_admission_boundaries(#[case] requested: u32, #[case] expected: Result<u32, Refusal>) {
        let mut engine = engine();
        assert_eq!(engine.reserve(BindingId(1), E, CAPACITY, requested), expected);
    }

    #[test]
    fn test_entities_are_isolated() {
        let mut engine = engine();
        let other = EntityId(2);

        engine.reserve(BindingId(1), E, CAPACITY, 100).unwrap();
        // a full entity does not affect admission elsewhere
        assert_eq!(engine.reserve(BindingId(2), other, CAPACITY, 100), Ok(100));
    }

    /// Replays a mixed reserve / modify / free sequence and checks the safety
    ///  invariant after every step: granted quanta on the entity never exceed its
    ///  capacity, and the tracked sum matches the per-reservation grants.
    #[test]
    fn test_capacity_invariant_over_sequence() {
        let mut engine = engine();

        let steps: Vec<(u64, u32)> = vec![
            (1, 40), (2, 40), (3, 40), (1, 0), (3, 10), (4, 30), (2, 90), (5, 100), (4, 0), (5, 60),
        ];

        for (binding, quantum) in steps {
            let binding = BindingId(binding);
            if quantum == 0 {
                let _ = engine.free_if_present(binding);
            }
            else if engine.reservation(binding).is_some() {
                let _ = engine.modify(binding, CAPACITY, quantum);
            }
            else {
                let _ = engine.reserve(binding, E, CAPACITY, quantum);
            }

            let tracked = engine.granted_on(E);
            let actual: u64 = engine.reservations.values()
                .filter(|c| c.entity == E)
                .map(|c| c.granted as u64)
                .sum();
            assert_eq!(tracked, actual);
            assert!(tracked <= CAPACITY as u64);
        }
    }
}
