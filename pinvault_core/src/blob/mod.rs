pub mod paths;
pub mod store;

/// Inputs at least this large are hashed on the blocking pool.
pub const BLOCKING_HASH_THRESHOLD: usize = 1 << 16;
