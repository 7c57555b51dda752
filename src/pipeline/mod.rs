//! Inbound-message-to-quote pipeline.
//!
//! The latest message in the mailbox flows through:
//! 1. `LocationExtractor`: marker line → location token → corrected name
//! 2. `Geocoder`: base location and destination → coordinates
//! 3. `DistanceCalculator`: coordinates → driving distance
//! 4. `ReplyComposer`: template + message + distance → generated reply
//! 5. `Dispatcher`: reply → Reply-To (or sender) address
//!
//! `Orchestrator` runs the stages in order and stops at the first failure.

pub mod composer;
pub mod dispatch;
pub mod extract;
pub mod orchestrator;
pub mod types;

pub use composer::ReplyComposer;
pub use dispatch::Dispatcher;
pub use extract::{Corrections, LocationExtractor};
pub use orchestrator::{Orchestrator, RunOutcome, Stage};
