use std::cell::Cell;
use std::ops::Range;

use crate::events::Tick;

/// Parts start one tick after the transport origin so the clock's tempo and
/// time signature are already corrected when the first event fires.
pub const SCHEDULE_OFFSET: Tick = 1;

/// Implemented by every event type a [`Part`] can hold.
pub trait PartEvent {
    fn tick(&self) -> Tick;
}

/// Outcome of reconciling a part against a replacement list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Lengths matched: only the differing indices were rescheduled.
    Incremental { replaced: usize },
    /// Length changed: the registry was cleared and rebuilt, so no stale
    /// index survives.
    FullRebuild { removed: usize, added: usize },
}

impl Reconcile {
    /// Total remove+add pairs performed.
    pub fn mutations(&self) -> usize {
        match self {
            Reconcile::Incremental { replaced } => *replaced,
            Reconcile::FullRebuild { removed, added } => *removed.max(added),
        }
    }
}

/// An event due within a driver step, with its absolute fire tick.
#[derive(Debug, Clone)]
pub struct Due<T> {
    pub tick: Tick,
    pub index: usize,
    pub event: T,
}

/// Ordered, index-addressable registry of time-stamped events bound to the
/// clock. Index assignment mirrors the external list position and stays
/// stable as long as the list length is unchanged.
#[derive(Debug)]
pub struct Part<T> {
    slots: Vec<Option<T>>,
    started: bool,
    offset: Tick,
    dispatching: Cell<bool>,
}

impl<T: PartEvent + Clone + PartialEq> Part<T> {
    pub fn new(events: &[T]) -> Self {
        Self {
            slots: events.iter().cloned().map(Some).collect(),
            started: false,
            offset: 0,
            dispatching: Cell::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn start(&mut self, offset: Tick) {
        self.started = true;
        self.offset = offset;
    }

    pub fn stop(&mut self) {
        self.started = false;
    }

    pub fn add(&mut self, index: usize, event: T) {
        self.assert_mutable();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(event);
    }

    pub fn remove(&mut self, index: usize) {
        self.assert_mutable();
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
    }

    pub fn clear(&mut self) {
        self.assert_mutable();
        self.slots.clear();
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    /// Positional diff against a replacement list. Equal lengths reschedule
    /// only the indices whose value changed; a length change clears the
    /// whole registry and re-adds every entry.
    pub fn reconcile(&mut self, new: &[T]) -> Reconcile {
        if new.len() == self.slots.len() {
            let mut replaced = 0;
            for (i, event) in new.iter().enumerate() {
                if self.slots[i].as_ref() != Some(event) {
                    self.remove(i);
                    self.add(i, event.clone());
                    replaced += 1;
                }
            }
            Reconcile::Incremental { replaced }
        } else {
            let removed = self.slots.len();
            self.clear();
            for (i, event) in new.iter().enumerate() {
                self.add(i, event.clone());
            }
            Reconcile::FullRebuild {
                removed,
                added: new.len(),
            }
        }
    }

    /// Events whose absolute fire tick (start offset + event tick) falls in
    /// `span`, ordered by tick with ties in registry-index order.
    pub fn collect_due(&self, span: &Range<Tick>) -> Vec<Due<T>> {
        if !self.started || span.is_empty() {
            return Vec::new();
        }
        let mut due: Vec<Due<T>> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let event = slot.as_ref()?;
                let tick = self.offset + event.tick();
                span.contains(&tick).then(|| Due {
                    tick,
                    index,
                    event: event.clone(),
                })
            })
            .collect();
        due.sort_by_key(|d| d.tick);
        due
    }

    /// Marks the start of a dispatch pass. Mutating the part before the
    /// matching [`Part::end_dispatch`] is a programming error and trips the
    /// guard in debug builds.
    pub fn begin_dispatch(&self) {
        self.dispatching.set(true);
    }

    pub fn end_dispatch(&self) {
        self.dispatching.set(false);
    }

    fn assert_mutable(&self) {
        debug_assert!(
            !self.dispatching.get(),
            "scheduled part mutated from inside its own dispatch"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ev {
        tick: Tick,
        value: u32,
    }

    impl PartEvent for Ev {
        fn tick(&self) -> Tick {
            self.tick
        }
    }

    fn ev(tick: Tick, value: u32) -> Ev {
        Ev { tick, value }
    }

    #[test]
    fn identical_resupply_makes_zero_mutations() {
        let list = vec![ev(0, 1), ev(96, 2), ev(192, 3)];
        let mut part = Part::new(&list);

        assert_eq!(part.reconcile(&list), Reconcile::Incremental { replaced: 0 });
    }

    #[test]
    fn same_length_diff_reschedules_only_changed_index() {
        let prev = vec![ev(0, 1), ev(96, 2), ev(192, 3)];
        let next = vec![ev(0, 1), ev(96, 9), ev(192, 3)];
        let mut part = Part::new(&prev);

        assert_eq!(part.reconcile(&next), Reconcile::Incremental { replaced: 1 });
        assert_eq!(part.get(1), Some(&ev(96, 9)));
        assert_eq!(part.get(0), Some(&ev(0, 1)));
    }

    #[test]
    fn length_change_rebuilds_everything() {
        let prev = vec![ev(0, 1), ev(96, 2), ev(192, 3)];
        let next = vec![ev(0, 1), ev(96, 2)];
        let mut part = Part::new(&prev);

        assert_eq!(
            part.reconcile(&next),
            Reconcile::FullRebuild {
                removed: 3,
                added: 2
            }
        );
        assert_eq!(part.len(), 2);
        assert_eq!(part.get(0), Some(&ev(0, 1)));
        assert_eq!(part.get(1), Some(&ev(96, 2)));
    }

    #[test]
    fn due_events_fire_in_tick_order_with_stable_ties() {
        // Index order deliberately not tick order; 2 and 3 share a tick.
        let list = vec![ev(50, 0), ev(10, 1), ev(30, 2), ev(30, 3)];
        let mut part = Part::new(&list);
        part.start(0);

        let due = part.collect_due(&(0..100));
        let order: Vec<(Tick, usize)> = due.iter().map(|d| (d.tick, d.index)).collect();
        assert_eq!(order, vec![(10, 1), (30, 2), (30, 3), (50, 0)]);
    }

    #[test]
    fn start_offset_shifts_fire_ticks() {
        let mut part = Part::new(&[ev(0, 1)]);
        part.start(SCHEDULE_OFFSET);

        assert!(part.collect_due(&(0..1)).is_empty());
        let due = part.collect_due(&(1..2));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].tick, SCHEDULE_OFFSET);
    }

    #[test]
    fn stopped_part_fires_nothing() {
        let mut part = Part::new(&[ev(0, 1)]);
        part.start(0);
        part.stop();
        assert!(part.collect_due(&(0..100)).is_empty());
    }

    #[test]
    fn removed_slot_does_not_fire() {
        let mut part = Part::new(&[ev(10, 1), ev(20, 2)]);
        part.remove(0);
        part.start(0);

        let due = part.collect_due(&(0..100));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].index, 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "mutated from inside its own dispatch")]
    fn reentrant_mutation_is_fatal() {
        let mut part = Part::new(&[ev(0, 1)]);
        part.begin_dispatch();
        part.remove(0);
    }
}
