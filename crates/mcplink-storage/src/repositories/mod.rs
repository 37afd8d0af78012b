//! Repository implementations using SQLite.

mod server_repository;

pub use server_repository::SqliteServerRepository;
