// ABOUTME: Command module aggregator for the switchyard CLI.
// ABOUTME: Re-exports the deploy, status, rollback, release, and resolve handlers.

mod deploy;
mod release;
mod resolve;
mod rollback;
mod session;
mod status;

pub use deploy::deploy;
pub use release::release;
pub use resolve::resolve;
pub use rollback::rollback;
pub use session::Session;
pub use status::status;
