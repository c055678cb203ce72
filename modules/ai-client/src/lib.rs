pub mod claude;
pub mod turns;

pub use claude::Claude;
pub use turns::{ChatTurn, TurnRole};
