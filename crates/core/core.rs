pub mod completion;
pub mod fileutil;
pub mod identity;
pub mod slotmap;
pub mod units;

pub use completion::{completion_pair, Completion, Completor};
pub use identity::{Ed25519Identity, Secp256k1Identity};
pub use slotmap::SlotMap;
