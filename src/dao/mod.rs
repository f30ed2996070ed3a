/// Track catalog collaborator (resolution and lookup of audio resources).
pub mod catalog;
/// Database model definitions.
pub mod models;
/// Persistence of the canonical playback record and listening history.
pub mod playback_store;
/// Storage abstraction layer for database operations.
pub mod storage;
