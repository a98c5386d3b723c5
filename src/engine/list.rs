// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Ordered event storage for a single track.
//!
//! Events live in an arena of slots addressed by stable [`EventHandle`]s;
//! playback order is a separate vector of slot indices kept sorted by
//! priority at all times. Handles survive unrelated mutations, which lets
//! the track keep a cursor into the list without borrowing from it.
//!
//! Sort invariant: ascending by priority; among equal priorities the most
//! recently inserted event comes first, because insertion always places a
//! new event before existing events of the same priority.

use super::event::{EventLabel, NoteEvent};
use crate::error::EngineError;

/// Stable handle to an event slot in an [`OrderedEventList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHandle(usize);

/// A mutable, always-sorted-by-time collection of note events.
pub struct OrderedEventList {
    /// Arena of event slots; `None` marks a freed slot
    slots: Vec<Option<NoteEvent>>,
    /// Freed slot indices available for reuse
    free: Vec<usize>,
    /// Slot indices in playback order
    order: Vec<usize>,
}

impl OrderedEventList {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Number of events in the list
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert an event at its sorted position.
    ///
    /// The event is placed before the first existing event whose priority is
    /// not less than its own, so the newest of several equal-priority events
    /// always comes first.
    pub fn insert(&mut self, event: NoteEvent) -> EventHandle {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(event);
                slot
            }
            None => {
                self.slots.push(Some(event));
                self.slots.len() - 1
            }
        };
        let position = self.insertion_position(self.priority_of(slot));
        self.order.insert(position, slot);
        EventHandle(slot)
    }

    /// Detach the first event (in playback order) with the given label,
    /// returning ownership of it to the caller for reuse.
    pub fn remove_by_label(&mut self, label: EventLabel) -> Result<NoteEvent, EngineError> {
        let handle = self
            .find_by_label(label)
            .ok_or(EngineError::NotFound(label))?;
        self.remove(handle).ok_or(EngineError::NotFound(label))
    }

    /// Detach the event behind `handle`, if it still exists.
    pub fn remove(&mut self, handle: EventHandle) -> Option<NoteEvent> {
        let position = self.position_of(handle)?;
        self.order.remove(position);
        let event = self.slots[handle.0].take();
        self.free.push(handle.0);
        event
    }

    /// Handle of the first event (in playback order) with the given label
    pub fn find_by_label(&self, label: EventLabel) -> Option<EventHandle> {
        self.order
            .iter()
            .copied()
            .find(|&slot| {
                self.slots[slot]
                    .as_ref()
                    .is_some_and(|event| event.label() == label)
            })
            .map(EventHandle)
    }

    /// First event in playback order
    pub fn head(&self) -> Option<EventHandle> {
        self.order.first().copied().map(EventHandle)
    }

    /// Event immediately after `handle` in playback order
    pub fn successor(&self, handle: EventHandle) -> Option<EventHandle> {
        let position = self.position_of(handle)?;
        self.handle_at(position + 1)
    }

    /// Position of `handle` in playback order, `None` if it was removed
    pub fn position_of(&self, handle: EventHandle) -> Option<usize> {
        if self.slots.get(handle.0)?.is_none() {
            return None;
        }
        self.order.iter().position(|&slot| slot == handle.0)
    }

    /// Handle at a playback-order position
    pub fn handle_at(&self, position: usize) -> Option<EventHandle> {
        self.order.get(position).copied().map(EventHandle)
    }

    /// Read the event behind a handle
    pub fn get(&self, handle: EventHandle) -> Option<&NoteEvent> {
        self.slots.get(handle.0)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: EventHandle) -> Option<&mut NoteEvent> {
        self.slots.get_mut(handle.0)?.as_mut()
    }

    /// Iterate events in playback order
    pub fn iter(&self) -> impl Iterator<Item = &NoteEvent> {
        self.order
            .iter()
            .filter_map(move |&slot| self.slots[slot].as_ref())
    }

    /// Iterate handles in playback order
    pub fn handles(&self) -> impl Iterator<Item = EventHandle> + '_ {
        self.order.iter().copied().map(EventHandle)
    }

    /// Remove every event
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.order.clear();
    }

    /// Multiply every priority by `ratio` and forget all iteration stamps.
    ///
    /// A uniform positive scale preserves the sort order, so the order
    /// vector is left untouched.
    pub(crate) fn rescale(&mut self, ratio: f64) {
        for slot in &mut self.slots {
            if let Some(event) = slot {
                event.set_priority(event.priority() * ratio);
                event.clear_iteration_stamp();
            }
        }
    }

    /// Forget every event's iteration stamp
    pub(crate) fn clear_iteration_stamps(&mut self) {
        for slot in &mut self.slots {
            if let Some(event) = slot {
                event.clear_iteration_stamp();
            }
        }
    }

    /// Rebuild the order vector by re-inserting every event through the
    /// normal insertion search, in current playback order.
    ///
    /// Used after a bulk priority change that may reorder events
    /// (quantization snapping). Events colliding on the same priority end
    /// up newest-reinserted-first, matching the insertion tie-break.
    pub(crate) fn reinsert_in_order(&mut self) {
        let previous = std::mem::take(&mut self.order);
        for slot in previous {
            let position = self.insertion_position(self.priority_of(slot));
            self.order.insert(position, slot);
        }
    }

    /// First order position whose event's priority is not less than `priority`
    fn insertion_position(&self, priority: f64) -> usize {
        self.order
            .partition_point(|&slot| self.priority_of(slot) < priority)
    }

    fn priority_of(&self, slot: usize) -> f64 {
        self.slots[slot]
            .as_ref()
            .map(|event| event.priority())
            .unwrap_or(f64::INFINITY)
    }

    #[cfg(test)]
    fn is_sorted(&self) -> bool {
        self.order
            .windows(2)
            .all(|pair| self.priority_of(pair[0]) <= self.priority_of(pair[1]))
    }
}

impl Default for OrderedEventList {
    fn default() -> Self {
        Self::new()
    }
}
