//! Example: Browsing the BDL catalogue and fetching data.
//!
//! Works without an API key; set `LDB_API_KEY` for the higher registered
//! quotas.
//!
//! Run with: cargo run --example public_data

use ldb_api_client::Ldb;
use ldb_api_client::rest::{
    DataByVariable, FetchOptions, GetVersion, ListSubjects, Resource, SortedList, UnitQuery,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    tracing_subscriber::fmt::init();

    let ldb = Ldb::from_env()?;
    let client = ldb.client()?;

    println!("=== API Version ===");
    let version = client.fetch_single(&GetVersion::default()).await?;
    println!("{}", version);

    println!("\n=== Levels ===");
    let levels = client
        .fetch_all(&SortedList::new(Resource::Levels), &FetchOptions::default())
        .await?;
    for level in &levels.results {
        println!("{}: {}", level["id"], level["name"]);
    }

    println!("\n=== Top-level Subjects ===");
    let subjects = client
        .fetch_all(
            &ListSubjects::default(),
            &FetchOptions::default().first_page_only(),
        )
        .await?;
    for subject in subjects.results.iter().take(5) {
        println!("{}: {}", subject["id"], subject["name"]);
    }

    println!("\n=== Voivodeships ===");
    let units = client
        .fetch_all(&UnitQuery::units().level(2), &FetchOptions::default())
        .await?;
    println!("{} units over {} page(s)", units.len(), units.pages);

    println!("\n=== Population by Voivodeship, 2021 ===");
    let data = client
        .fetch_all(
            &DataByVariable::new("72305").year(2021).unit_level(2),
            &FetchOptions::default(),
        )
        .await?;
    for row in data.results.iter().take(5) {
        println!("{}: {}", row["name"], row["values"][0]["val"]);
    }

    println!("\n=== Remaining Quota ===");
    for (period, remaining) in ldb.registry().async_governor().remaining().await {
        println!("{}: {}", period, remaining);
    }

    Ok(())
}
