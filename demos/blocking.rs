//! Example: The blocking client.
//!
//! Run with: cargo run --example blocking

use ldb_api_client::Ldb;
use ldb_api_client::rest::{FetchOptions, ListVariables, Resource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let client = Ldb::from_env()?.blocking_client()?;

    let metadata = client.fetch_single(&Resource::Years.metadata())?;
    println!("Years metadata: {}", metadata);

    // Pages are fetched lazily, one quota slot each.
    let options = FetchOptions::default().page_size(50).max_pages(3);
    for (index, page) in client
        .pages(&ListVariables::for_subject("P2425"), &options)?
        .enumerate()
    {
        let page = page?;
        let count = page["results"].as_array().map_or(0, Vec::len);
        println!("page {}: {} variables", index, count);
    }

    Ok(())
}
