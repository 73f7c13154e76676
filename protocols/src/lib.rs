pub mod frame;
pub mod hash;
pub mod ident;

pub use frame::{Frame, FrameError};
