//! Ledger services for the inventory and production ledger
//!
//! Every operation takes the tenant explicitly; none of them look up
//! permissions.

use chrono::{NaiveDate, Utc};

pub mod ledger;
pub mod lots;
pub mod materials;
pub mod production;
pub mod products;
pub mod recipes;
pub mod sales;
pub mod units;

pub use ledger::{KardexEntry, MovementLedger, PostMovementInput};
pub use lots::LotService;
pub use materials::{CreateMaterialInput, MaterialService, MaterialStock};
pub use production::{CreateProductionOrderInput, ProductionService};
pub use products::{CreateProductInput, ProductService};
pub use recipes::{CreateRecipeInput, RecipeService};
pub use sales::{CreateSalesOrderInput, SalesService};
pub use units::UnitService;

/// Current UTC calendar date; lot status and FEFO eligibility are judged on it
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
