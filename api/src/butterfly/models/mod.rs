mod account;
mod butterfly;

pub use account::{AccountSummary, Community, User};
pub use butterfly::Butterfly;
