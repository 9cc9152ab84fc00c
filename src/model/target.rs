//! Target slots and their swap history.
//!
//! A slot is the screen position the user anchored by registering a target.
//! Whichever window currently occupies it is the slot's `element`; after each
//! swap the incoming window takes over the same [`TargetState`] and the
//! window-server id index is rebuilt, so slot identity never depends on a key
//! that changes mid-flight.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use strum::Display;
use tracing::{trace, warn};

use crate::common::collections::HashMap;
use crate::sys::geometry::Rect;
use crate::sys::window_server::WindowServerId;

new_key_type! {
    pub struct TargetSlot;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SwapMode {
    /// Exchange frames completely.
    #[default]
    Full,
    /// Exchange centers; each window keeps its size.
    PositionOnly,
}

impl SwapMode {
    pub fn toggled(self) -> Self {
        match self {
            SwapMode::Full => SwapMode::PositionOnly,
            SwapMode::PositionOnly => SwapMode::Full,
        }
    }
}

/// A window that entered the slot, with the frame it had just before.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEntry<H> {
    pub handle: H,
    pub original_frame: Rect,
}

#[derive(Debug, Clone)]
pub struct TargetState<H> {
    pub element: H,
    pub swap_mode: SwapMode,
    pub last_swapped_partner: Option<H>,
    pub original_target_element: H,
    pub original_target_frame: Rect,
    /// Chronological; every window that has occupied the slot.
    pub swap_chain: Vec<ChainEntry<H>>,
    pub last_access: Instant,
    access_seq: u64,
}

impl<H: Clone + PartialEq> TargetState<H> {
    pub fn new(element: H, frame: Rect, swap_mode: SwapMode) -> Self {
        Self {
            original_target_element: element.clone(),
            element,
            swap_mode,
            last_swapped_partner: None,
            original_target_frame: frame,
            swap_chain: Vec::new(),
            last_access: Instant::now(),
            access_seq: 0,
        }
    }

    /// The frame `handle` had before it most recently entered the slot.
    pub fn original_frame_of(&self, handle: &H) -> Option<Rect> {
        self.swap_chain
            .iter()
            .rev()
            .find(|entry| entry.handle == *handle)
            .map(|entry| entry.original_frame)
    }

    /// Starts the history on the first swap.
    pub fn seed_chain(&mut self, other: H, other_frame: Rect) {
        self.swap_chain = vec![
            ChainEntry {
                handle: self.original_target_element.clone(),
                original_frame: self.original_target_frame,
            },
            ChainEntry { handle: other, original_frame: other_frame },
        ];
    }

    pub fn record_entry(&mut self, handle: H, original_frame: Rect) {
        self.swap_chain.push(ChainEntry { handle, original_frame });
    }

    /// Transfers the slot to `incoming`; the window it displaces becomes the
    /// partner for a later toggle.
    pub fn hand_over(&mut self, incoming: H) {
        let outgoing = std::mem::replace(&mut self.element, incoming);
        self.last_swapped_partner = Some(outgoing);
    }
}

/// Arena of target slots with a window-id index over it.
#[derive(Debug)]
pub struct TargetStore<H> {
    slots: SlotMap<TargetSlot, TargetState<H>>,
    by_window: HashMap<WindowServerId, TargetSlot>,
    active: Option<TargetSlot>,
    next_access: u64,
}

impl<H> Default for TargetStore<H> {
    fn default() -> Self {
        Self {
            slots: SlotMap::default(),
            by_window: HashMap::default(),
            active: None,
            next_access: 0,
        }
    }
}

impl<H: Clone + PartialEq> TargetStore<H> {
    pub fn new() -> Self { Self::default() }

    /// Stores a new slot and activates it. A slot already keyed under `id`
    /// is replaced.
    pub fn insert(&mut self, id: Option<WindowServerId>, state: TargetState<H>) -> TargetSlot {
        if let Some(old) = id.and_then(|id| self.by_window.get(&id).copied()) {
            trace!(?id, "Replacing existing target slot");
            self.remove(old);
        }
        let slot = self.slots.insert(state);
        if let Some(id) = id {
            self.by_window.insert(id, slot);
        }
        self.touch(slot);
        self.active = Some(slot);
        slot
    }

    pub fn remove(&mut self, slot: TargetSlot) -> Option<TargetState<H>> {
        self.by_window.retain(|_, s| *s != slot);
        if self.active == Some(slot) {
            self.active = None;
        }
        self.slots.remove(slot)
    }

    pub fn get(&self, slot: TargetSlot) -> Option<&TargetState<H>> { self.slots.get(slot) }

    pub fn get_mut(&mut self, slot: TargetSlot) -> Option<&mut TargetState<H>> {
        self.slots.get_mut(slot)
    }

    pub fn active(&self) -> Option<TargetSlot> { self.active }

    pub fn active_state(&self) -> Option<&TargetState<H>> {
        self.active.and_then(|slot| self.slots.get(slot))
    }

    pub fn set_active(&mut self, slot: Option<TargetSlot>) {
        self.active = slot.filter(|slot| self.slots.contains_key(*slot));
    }

    pub fn touch(&mut self, slot: TargetSlot) {
        self.next_access += 1;
        let seq = self.next_access;
        if let Some(state) = self.slots.get_mut(slot) {
            state.access_seq = seq;
            state.last_access = Instant::now();
        }
    }

    pub fn slot_for(&self, id: WindowServerId) -> Option<TargetSlot> {
        self.by_window.get(&id).copied()
    }

    pub fn window_of(&self, slot: TargetSlot) -> Option<WindowServerId> {
        self.by_window.iter().find(|(_, s)| **s == slot).map(|(id, _)| *id)
    }

    /// Slots ordered most recently accessed first.
    pub fn by_recency(&self) -> Vec<TargetSlot> {
        let mut slots: Vec<_> = self.slots.iter().map(|(slot, s)| (s.access_seq, slot)).collect();
        slots.sort_by(|a, b| b.0.cmp(&a.0));
        slots.into_iter().map(|(_, slot)| slot).collect()
    }

    /// Rebuilds the id index from each slot's current element. When two slots
    /// resolve to the same window, the more recently accessed one keeps it.
    pub fn reindex(&mut self, mut resolve: impl FnMut(&H) -> Option<WindowServerId>) {
        let mut by_window = HashMap::default();
        for slot in self.by_recency() {
            let Some(state) = self.slots.get(slot) else { continue };
            match resolve(&state.element) {
                Some(id) => {
                    by_window.entry(id).or_insert(slot);
                }
                None => warn!(?slot, "Cannot resolve window id for target slot"),
            }
        }
        self.by_window = by_window;
    }

    pub fn len(&self) -> usize { self.slots.len() }

    pub fn is_empty(&self) -> bool { self.slots.is_empty() }
}
