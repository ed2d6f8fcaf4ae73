pub mod account_pool;
pub mod cancel;
pub mod catalog_client;
pub mod clock;
pub mod collector;
pub mod dispatcher;
pub mod mailer;

pub use account_pool::*;
pub use cancel::*;
pub use catalog_client::*;
pub use clock::*;
pub use collector::*;
pub use dispatcher::*;
pub use mailer::*;
