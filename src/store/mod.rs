//! Session persistence: the `SessionStore` contract plus in-memory and
//! libSQL backends.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlSessionStore;
pub use memory::InMemorySessionStore;
pub use traits::SessionStore;
