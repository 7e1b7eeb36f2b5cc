pub mod audit;
pub mod journey;
pub mod listing;
pub mod page;
pub mod transaction;
pub mod user;
pub mod verification;
pub mod wallet;
