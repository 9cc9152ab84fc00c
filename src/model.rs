pub mod target;

pub use target::{ChainEntry, SwapMode, TargetSlot, TargetState, TargetStore};
