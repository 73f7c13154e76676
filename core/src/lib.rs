pub mod delivery;
pub mod discovery;
pub mod events;
pub mod node;
pub mod transfer;
