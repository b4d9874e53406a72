//! The observable state container.
//!
//! A [`Store`] owns one value and a list of subscribers. Updates go through
//! a [`Comparer`] and only real changes are delivered.

mod equality;
mod listeners;
mod store;

pub use equality::Comparer;
pub(crate) use listeners::{Detach, Listeners};
pub use listeners::{Subscription, SubscriptionGuard};
pub use store::{Store, Update};
