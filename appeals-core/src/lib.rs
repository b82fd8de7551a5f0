pub mod appeal;
pub mod client;
pub mod lifecycle;

pub use appeal::*;
pub use client::{AppealsClient, DEFAULT_SERVER_URL};
pub use lifecycle::{Operation, TransitionRule};
