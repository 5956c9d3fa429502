use rand::Rng;

use carseek_core::domain::vehicle::NewVehicle;

use crate::repositories::{RepositoryError, SqliteVehicleRepository, VehicleRepository};
use crate::DbPool;

const BRANDS_MODELS: &[(&str, &[&str])] = &[
    ("Toyota", &["Camry", "Corolla", "RAV4", "Highlander", "Prius", "Tacoma"]),
    ("Honda", &["Civic", "Accord", "CR-V", "Pilot", "Fit", "Odyssey"]),
    ("Ford", &["F-150", "Mustang", "Explorer", "Escape", "Fusion", "Bronco"]),
    ("Chevrolet", &["Silverado", "Malibu", "Equinox", "Tahoe", "Corvette", "Camaro"]),
    ("BMW", &["3 Series", "5 Series", "X3", "X5", "7 Series", "M4"]),
    ("Mercedes-Benz", &["C-Class", "E-Class", "S-Class", "GLE", "GLC", "A-Class"]),
    ("Audi", &["A4", "A6", "Q5", "Q7", "A3", "Q3"]),
    ("Tesla", &["Model 3", "Model S", "Model X", "Model Y"]),
    ("Volkswagen", &["Jetta", "Passat", "Tiguan", "Atlas", "Golf", "ID.4"]),
    ("Nissan", &["Altima", "Sentra", "Rogue", "Pathfinder", "Maxima", "Leaf"]),
    ("Hyundai", &["Elantra", "Sonata", "Tucson", "Santa Fe", "Kona", "Ioniq"]),
    ("Kia", &["Forte", "Optima", "Sportage", "Sorento", "Soul", "Telluride"]),
    ("Mazda", &["Mazda3", "Mazda6", "CX-5", "CX-9", "MX-5 Miata", "CX-30"]),
    ("Subaru", &["Outback", "Forester", "Crosstrek", "Impreza", "Ascent", "WRX"]),
    ("Lexus", &["ES", "RX", "NX", "IS", "GX", "UX"]),
    ("Porsche", &["911", "Cayenne", "Macan", "Panamera", "Taycan"]),
    ("Jeep", &["Wrangler", "Grand Cherokee", "Cherokee", "Compass", "Gladiator"]),
    ("Ram", &["1500", "2500", "3500"]),
    ("Volvo", &["XC90", "XC60", "S60", "V60", "XC40"]),
    ("Land Rover", &["Range Rover", "Discovery", "Defender", "Evoque"]),
];

const COLORS: &[&str] = &[
    "White", "Black", "Silver", "Gray", "Red", "Blue", "Green", "Yellow", "Orange", "Brown",
    "Beige", "Gold", "Purple", "Navy",
];

const PERFORMANCE_BRANDS: &[&str] = &["BMW", "Mercedes-Benz", "Audi", "Porsche"];
const DUAL_CLUTCH_BRANDS: &[&str] = &["BMW", "Audi", "Porsche"];

fn base_price(brand: &str) -> f64 {
    match brand {
        "Toyota" => 25_000.0,
        "Honda" => 24_000.0,
        "Ford" => 28_000.0,
        "Chevrolet" => 27_000.0,
        "BMW" => 45_000.0,
        "Mercedes-Benz" => 50_000.0,
        "Audi" => 43_000.0,
        "Tesla" => 48_000.0,
        "Volkswagen" => 23_000.0,
        "Nissan" => 22_000.0,
        "Hyundai" => 21_000.0,
        "Kia" => 22_000.0,
        "Mazda" => 24_000.0,
        "Subaru" => 26_000.0,
        "Lexus" => 42_000.0,
        "Porsche" => 75_000.0,
        "Jeep" => 32_000.0,
        "Ram" => 35_000.0,
        "Volvo" => 40_000.0,
        "Land Rover" => 55_000.0,
        _ => 25_000.0,
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Random but plausible inventory. Drivetrain, transmission and price follow
/// the brand: Teslas are electric, German performance brands skew toward
/// larger engines and dual-clutch boxes, newer low-mileage cars cost more.
pub struct VehicleGenerator;

impl VehicleGenerator {
    pub fn generate(count: u32) -> Vec<NewVehicle> {
        let mut rng = rand::thread_rng();
        Self::generate_with(&mut rng, count)
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, count: u32) -> Vec<NewVehicle> {
        let mut vehicles = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let (brand, models) = BRANDS_MODELS[rng.gen_range(0..BRANDS_MODELS.len())];
            let model = models[rng.gen_range(0..models.len())];
            let year: i32 = rng.gen_range(2015..=2025);

            let (engine_type, fuel_type) = if brand == "Tesla" {
                ("electric", "electric")
            } else if model.contains("Prius") || model.contains("Ioniq") || rng.gen_bool(0.15) {
                ("hybrid", "hybrid")
            } else if PERFORMANCE_BRANDS.contains(&brand) && rng.gen_bool(0.3) {
                (["v6", "v8"][rng.gen_range(0..2)], "gasoline")
            } else if rng.gen_bool(0.1) {
                ("inline_4", "diesel")
            } else {
                (["inline_4", "inline_6", "v6"][rng.gen_range(0..3)], "gasoline")
            };

            let color = COLORS[rng.gen_range(0..COLORS.len())];
            let mileage = round_to(rng.gen_range(0.0..=150_000.0), 1);
            let number_of_doors = [2, 4, 5][rng.gen_range(0..3)];

            let transmission = if year >= 2020 && rng.gen_bool(0.7) {
                "automatic"
            } else if DUAL_CLUTCH_BRANDS.contains(&brand) && rng.gen_bool(0.2) {
                "dual_clutch"
            } else if rng.gen_bool(0.15) {
                "manual"
            } else {
                ["automatic", "cvt"][rng.gen_range(0..2)]
            };

            let year_factor = f64::from(year - 2015) * 0.05 + 1.0;
            let mileage_factor = (1.0 - mileage / 200_000.0).max(0.5);
            let price = round_to(base_price(brand) * year_factor * mileage_factor, 2);

            vehicles.push(NewVehicle {
                brand: brand.to_string(),
                model: model.to_string(),
                year,
                engine_type: engine_type.to_string(),
                fuel_type: fuel_type.to_string(),
                color: color.to_string(),
                mileage,
                number_of_doors,
                transmission: transmission.to_string(),
                price,
            });
        }

        vehicles
    }
}

#[derive(Debug)]
pub struct SeedReport {
    pub requested: u32,
    pub inserted: u32,
    pub total_vehicles: i64,
}

#[derive(Debug)]
pub struct SeedVerification {
    pub all_passed: bool,
    pub checks: Vec<(&'static str, bool)>,
}

/// Seeds the inventory the chat workflow searches against.
pub struct VehicleSeeder;

impl VehicleSeeder {
    /// Replaces the current inventory with `count` freshly generated vehicles.
    pub async fn load(pool: &DbPool, count: u32) -> Result<SeedReport, RepositoryError> {
        let vehicles = VehicleGenerator::generate(count);

        sqlx::query("DELETE FROM vehicles").execute(pool).await?;

        let repo = SqliteVehicleRepository::new(pool.clone());
        let inserted = repo.insert_many(&vehicles).await?;
        let total_vehicles = repo.count().await?;

        tracing::info!(inserted, total_vehicles, "seeded vehicle inventory");

        Ok(SeedReport { requested: count, inserted, total_vehicles })
    }

    /// Verify the seeded inventory honors the generator's contract.
    pub async fn verify(
        pool: &DbPool,
        expected_count: u32,
    ) -> Result<SeedVerification, RepositoryError> {
        let mut checks = Vec::new();

        let total: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM vehicles").fetch_one(pool).await?;
        checks.push(("vehicle-count", total == i64::from(expected_count)));

        let quoted_brands = BRANDS_MODELS
            .iter()
            .map(|(brand, _)| format!("'{brand}'"))
            .collect::<Vec<_>>()
            .join(",");
        let unknown_brands: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM vehicles WHERE brand NOT IN ({quoted_brands})"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("brands-in-catalog", unknown_brands == 0));

        let non_electric_teslas: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM vehicles
             WHERE brand = 'Tesla' AND (engine_type != 'electric' OR fuel_type != 'electric')",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("teslas-electric", non_electric_teslas == 0));

        let out_of_range_years: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM vehicles WHERE year < 2015 OR year > 2025")
                .fetch_one(pool)
                .await?;
        checks.push(("years-in-range", out_of_range_years == 0));

        let out_of_range_mileage: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM vehicles WHERE mileage < 0 OR mileage > 150000",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("mileage-in-range", out_of_range_mileage == 0));

        let invalid_doors: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM vehicles WHERE number_of_doors NOT IN (2, 4, 5)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("doors-valid", invalid_doors == 0));

        let unpriced: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM vehicles WHERE price IS NULL OR price <= 0")
                .fetch_one(pool)
                .await?;
        checks.push(("vehicles-priced", unpriced == 0));

        let all_passed = checks.iter().all(|(_, passed)| *passed);
        Ok(SeedVerification { all_passed, checks })
    }
}
