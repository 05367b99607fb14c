use ldb_api_client::Ldb;
use ldb_api_client::rest::{FetchOptions, GetVersion, Resource, SortedList};

fn live_tests_enabled() -> bool {
    std::env::var("LDB_LIVE_TESTS").ok().as_deref() == Some("1")
}

#[tokio::test]
#[ignore]
async fn live_async_smoke() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv::dotenv();
    if !live_tests_enabled() {
        return Ok(());
    }

    let client = Ldb::from_env()?.client()?;

    let version = client.fetch_single(&GetVersion::default()).await?;
    assert!(version.is_object());

    let years = client
        .fetch_all(
            &SortedList::new(Resource::Years),
            &FetchOptions::default().first_page_only(),
        )
        .await?;
    assert!(!years.is_empty());

    Ok(())
}

#[test]
#[ignore]
fn live_blocking_smoke() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv::dotenv();
    if !live_tests_enabled() {
        return Ok(());
    }

    let client = Ldb::from_env()?.blocking_client()?;
    let levels = client.fetch_single_results(&SortedList::new(Resource::Levels), "results")?;
    assert!(!levels.is_empty());

    Ok(())
}
