pub mod account_db;
pub mod identity_db;
pub mod json_file;
pub mod search_term_db;
pub mod sent_db;

pub use json_file::StoreError;
