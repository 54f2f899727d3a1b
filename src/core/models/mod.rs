pub mod expense;
pub mod room;
pub mod round;
pub mod settlement;
pub mod user;
