//! Building blocks of the synchronization engine

pub mod detector;
pub mod image_cache;
pub mod position;
pub mod scheduler;

pub use detector::{ChangeDetector, Observation, Ticket};
pub use image_cache::{Artwork, ImageCache, ImageLookup};
pub use position::{PositionExtrapolator, PositionSample, PositionTick, StreamStats};
pub use scheduler::Scheduler;
