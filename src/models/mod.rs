pub mod room;
pub mod user;

pub use room::{Room, RoomKey, RoomParams};
pub use user::{Claims, Session, TokenInfo, User};
