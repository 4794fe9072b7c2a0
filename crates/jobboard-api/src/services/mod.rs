//! Business logic services.

pub mod session_sweeper;
pub mod user;

pub use session_sweeper::SessionSweeper;
pub use user::UserService;
