//! Lot Ledger - inventory and production ledger
//!
//! Raw-material stock accounting, recipe-driven production into dated lots
//! and first-expired-first-out sales consumption, over PostgreSQL.

use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod policy;
pub mod routes;
pub mod services;

pub use config::{Config, LedgerSettings};
pub use error::{AppError, AppResult};
pub use policy::{AccessPolicy, Permission};

use services::{
    LotService, MaterialService, MovementLedger, ProductService, ProductionService,
    RecipeService, SalesService, UnitService,
};

/// Every ledger service over one pool
#[derive(Clone)]
pub struct Ledger {
    pub units: UnitService,
    pub materials: MaterialService,
    pub products: ProductService,
    pub movements: MovementLedger,
    pub recipes: RecipeService,
    pub production: ProductionService,
    pub lots: LotService,
    pub sales: SalesService,
}

impl Ledger {
    pub fn new(db: PgPool, settings: LedgerSettings) -> Self {
        Self {
            units: UnitService::new(db.clone()),
            materials: MaterialService::new(db.clone()),
            products: ProductService::new(db.clone()),
            movements: MovementLedger::new(db.clone(), settings),
            recipes: RecipeService::new(db.clone()),
            production: ProductionService::new(db.clone(), settings),
            lots: LotService::new(db.clone(), settings),
            sales: SalesService::new(db, settings),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub ledger: Ledger,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let ledger = Ledger::new(db.clone(), config.ledger);
        Self {
            db,
            config: Arc::new(config),
            ledger,
        }
    }

    /// Role grants loaded at start-up
    pub fn access(&self) -> &AccessPolicy {
        &self.config.access
    }
}

/// Create the application router with probes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::probe_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
