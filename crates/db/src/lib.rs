pub mod connection;
pub mod executor;
pub mod migrations;
pub mod repositories;
pub mod seed;

pub use connection::{connect, connect_with_settings, DbPool};
pub use executor::{strip_code_fences, QueryExecutionError, QueryExecutor, SqliteQueryExecutor};
pub use repositories::{RepositoryError, SqliteVehicleRepository, VehicleRepository};
pub use seed::{SeedReport, SeedVerification, VehicleGenerator, VehicleSeeder};
