use serde::{Deserialize, Serialize};

/// One row of the `vehicles` inventory table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub engine_type: String,
    pub fuel_type: String,
    pub color: String,
    pub mileage: f64,
    pub number_of_doors: i32,
    pub transmission: String,
    pub price: Option<f64>,
}

/// A vehicle awaiting insertion; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewVehicle {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub engine_type: String,
    pub fuel_type: String,
    pub color: String,
    pub mileage: f64,
    pub number_of_doors: i32,
    pub transmission: String,
    pub price: f64,
}

/// Cheapest listed price per brand, ordered ascending.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrandMinPrice {
    pub brand: String,
    pub min_price: f64,
}
