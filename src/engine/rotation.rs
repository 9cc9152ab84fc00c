//! Destination planning for swaps and rotations. Pure; nothing here touches
//! a window.

use crate::model::SwapMode;
use crate::sys::geometry::Rect;

/// One window mutation in a swap, applied in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Move<H> {
    pub handle: H,
    pub from: Rect,
    pub to: Rect,
    /// A required move failing aborts the swap; an optional one is skipped.
    pub required: bool,
}

/// Where a window with frame `current` lands when it takes over `slot`.
pub fn destination(mode: SwapMode, current: &Rect, slot: &Rect) -> Rect {
    match mode {
        SwapMode::Full => *slot,
        SwapMode::PositionOnly => current.centered_at(slot.center()),
    }
}

fn movement<H>(mode: SwapMode, handle: H, from: Rect, slot: Rect, required: bool) -> Move<H> {
    Move {
        handle,
        from,
        to: destination(mode, &from, &slot),
        required,
    }
}

/// The target moves first, then the other window.
pub fn plan_simple<H: Clone>(
    mode: SwapMode,
    target: &H,
    target_frame: Rect,
    other: &H,
    other_frame: Rect,
) -> Vec<Move<H>> {
    vec![
        movement(mode, target.clone(), target_frame, other_frame, true),
        movement(mode, other.clone(), other_frame, target_frame, true),
    ]
}

/// Everything a rotation needs to know about its three windows. `A` is the
/// slot's original target, `B` the current occupant and `C` the incoming
/// window.
#[derive(Debug, Clone)]
pub struct Rotation<H> {
    pub original: H,
    pub original_frame: Rect,
    /// Where `A` is now; `None` if it can no longer be read.
    pub original_current: Option<Rect>,
    pub current: H,
    pub current_frame: Rect,
    /// Where `B` was before it entered the slot, from the chain.
    pub current_home: Option<Rect>,
    pub incoming: H,
    pub incoming_frame: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan<H> {
    Rotation(Vec<Move<H>>),
    /// `B` had no recorded home; swap `B` and `C` directly.
    Degraded(Vec<Move<H>>),
}

impl<H> Plan<H> {
    pub fn moves(&self) -> &[Move<H>] {
        match self {
            Plan::Rotation(moves) | Plan::Degraded(moves) => moves,
        }
    }
}

impl<H: Clone + PartialEq> Rotation<H> {
    /// `A` takes `C`'s place, `B` returns home, `C` claims `A`'s original
    /// frame. Moves are ordered so `C` arrives last, after the slot is clear.
    pub fn plan(&self, mode: SwapMode) -> Plan<H> {
        let Some(home) = self.current_home else {
            return Plan::Degraded(plan_simple(
                mode,
                &self.current,
                self.current_frame,
                &self.incoming,
                self.incoming_frame,
            ));
        };

        let mut moves = Vec::with_capacity(3);
        let original_is_current = self.original == self.current;
        if self.original != self.incoming {
            let from = if original_is_current { Some(self.current_frame) } else { self.original_current };
            if let Some(from) = from {
                moves.push(movement(
                    mode,
                    self.original.clone(),
                    from,
                    self.incoming_frame,
                    original_is_current,
                ));
            }
        }
        if !original_is_current {
            moves.push(movement(mode, self.current.clone(), self.current_frame, home, true));
        }
        moves.push(movement(
            mode,
            self.incoming.clone(),
            self.incoming_frame,
            self.original_frame,
            true,
        ));
        Plan::Rotation(moves)
    }
}
