pub mod duration;
pub mod moment;
pub mod period;
pub mod weekday;

#[cfg(test)]
mod tests;

pub use duration::*;
pub use moment::*;
pub use period::*;
pub use weekday::*;
