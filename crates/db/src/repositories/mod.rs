use async_trait::async_trait;
use thiserror::Error;

use carseek_core::domain::vehicle::{BrandMinPrice, NewVehicle, Vehicle};

pub mod vehicle;

pub use vehicle::SqliteVehicleRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait VehicleRepository: Send + Sync {
    async fn insert_many(&self, vehicles: &[NewVehicle]) -> Result<u32, RepositoryError>;

    async fn count(&self) -> Result<i64, RepositoryError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Vehicle>, RepositoryError>;

    /// Cheapest listing per brand, ordered cheapest brand first.
    async fn brand_min_prices(&self) -> Result<Vec<BrandMinPrice>, RepositoryError>;
}
