//! The leaf components: identity correlation, frame mutation, visibility
//! classification and window discovery.

pub mod discovery;
pub mod frame;
pub mod identity;
pub mod visibility;

pub use discovery::{WindowDiscovery, WindowRecord, WindowSummary};
pub use frame::{FrameError, FrameMutator};
pub use identity::IdentityResolver;
pub use visibility::{Visibility, VisibilityClassifier};
