mod agent;
mod npc;
mod office;
mod room;

pub use agent::*;
pub use npc::*;
pub use office::*;
pub use room::*;
