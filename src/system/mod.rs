pub mod device;
pub mod reset;

pub use device::{init_task_watchdog, EspDevice};
