pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{new_backend, seeded_bytes, stage_bytes};
