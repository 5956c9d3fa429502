use sqlx::{sqlite::SqliteRow, Row};

use carseek_core::domain::vehicle::{BrandMinPrice, NewVehicle, Vehicle};

use super::{RepositoryError, VehicleRepository};
use crate::DbPool;

pub struct SqliteVehicleRepository {
    pool: DbPool,
}

impl SqliteVehicleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl VehicleRepository for SqliteVehicleRepository {
    async fn insert_many(&self, vehicles: &[NewVehicle]) -> Result<u32, RepositoryError> {
        let mut inserted = 0u32;
        for vehicle in vehicles {
            sqlx::query(
                "INSERT INTO vehicles (
                    brand,
                    model,
                    year,
                    engine_type,
                    fuel_type,
                    color,
                    mileage,
                    number_of_doors,
                    transmission,
                    price
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&vehicle.brand)
            .bind(&vehicle.model)
            .bind(vehicle.year)
            .bind(&vehicle.engine_type)
            .bind(&vehicle.fuel_type)
            .bind(&vehicle.color)
            .bind(vehicle.mileage)
            .bind(vehicle.number_of_doors)
            .bind(&vehicle.transmission)
            .bind(vehicle.price)
            .execute(&self.pool)
            .await?;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM vehicles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Vehicle>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                brand,
                model,
                year,
                engine_type,
                fuel_type,
                color,
                mileage,
                number_of_doors,
                transmission,
                price
             FROM vehicles
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(vehicle_from_row).transpose()
    }

    async fn brand_min_prices(&self) -> Result<Vec<BrandMinPrice>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT brand, MIN(price) AS min_price
             FROM vehicles
             WHERE price IS NOT NULL
             GROUP BY brand
             ORDER BY min_price",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(BrandMinPrice {
                    brand: row.try_get("brand")?,
                    min_price: row.try_get("min_price")?,
                })
            })
            .collect()
    }
}

fn vehicle_from_row(row: SqliteRow) -> Result<Vehicle, RepositoryError> {
    Ok(Vehicle {
        id: row.try_get("id")?,
        brand: row.try_get("brand")?,
        model: row.try_get("model")?,
        year: row.try_get("year")?,
        engine_type: row.try_get("engine_type")?,
        fuel_type: row.try_get("fuel_type")?,
        color: row.try_get("color")?,
        mileage: row.try_get("mileage")?,
        number_of_doors: row.try_get("number_of_doors")?,
        transmission: row.try_get("transmission")?,
        price: row.try_get("price")?,
    })
}
