mod clock;
mod controller;
mod engine;
mod phase;

pub use clock::{Clock, MonotonicClock};
pub use controller::{TimerController, TimerControllerBuilder};
pub use engine::{PomodoroEngine, TimerSnapshot, TimerState};
pub use phase::{Phase, Rotation};
