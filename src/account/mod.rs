//! Account records and the stores the auth core reads them from

pub mod models;
pub mod postgres;
pub mod store;

pub use models::{Account, LoginFailure, NewAccount};
pub use postgres::PgAccountStore;
pub use store::{AccountStore, MemoryAccountStore};
