//! Domain models for the inventory and production ledger

mod lot;
mod material;
mod product;
mod production;
mod recipe;
mod sales;
mod unit;

pub use lot::*;
pub use material::*;
pub use product::*;
pub use production::*;
pub use recipe::*;
pub use sales::*;
pub use unit::*;
