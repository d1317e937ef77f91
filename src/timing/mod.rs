mod automation;
mod clock;
mod part;

pub use automation::{AutomationChange, AutomationScheduler};
pub use clock::{Clock, ClockSnapshot, PlaybackState};
pub use part::{Due, Part, PartEvent, Reconcile, SCHEDULE_OFFSET};
