pub mod list;
pub mod node;
pub mod schedule;


pub use list::*;
pub use node::*;
pub use schedule::*;
