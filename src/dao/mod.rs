/// Database model definitions.
pub mod models;
/// Premiere and attendee storage backends.
pub mod premiere_store;
/// Storage abstraction layer for database operations.
pub mod storage;
