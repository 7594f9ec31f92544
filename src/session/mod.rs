mod persist;
mod store;

pub use persist::{clear_snapshot, load_snapshot, save_snapshot};
pub use store::{Role, SessionStore, Snapshot};
