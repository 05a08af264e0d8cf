//! Storefront domain: aggregates, value objects, events and the order
//! mutation rules shared by every store.

pub mod aggregates;
pub mod events;
pub mod reconcile;
pub mod value_objects;
