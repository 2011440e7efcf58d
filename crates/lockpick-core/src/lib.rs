pub mod hints;
pub mod model;
pub mod protocol;

pub use hints::{generate_hints, is_win};
pub use model::{GameConfig, Player, Room, RoomStatus};
pub use protocol::{Frame, ServerEvent};
