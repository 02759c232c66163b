use prmetrics_core::Metric;
use prmetrics_store::{MemoryStore, SqliteStore, Storage};
use tempfile::tempdir;

fn metric(commit_sha: &str, name: &str, value: f64, is_reference: bool) -> Metric {
    Metric {
        commit_sha: commit_sha.to_owned(),
        name: name.to_owned(),
        value,
        units: "ms".to_owned(),
        threshold: 5.0,
        is_reference,
        is_increase_bad: true,
    }
}

async fn latest_row_per_name_wins(store: &dyn Storage) -> Result<(), Box<dyn std::error::Error>> {
    store.submit_metric(&metric("sha1", "cpu", 1.0, false)).await?;
    store.submit_metric(&metric("sha1", "mem", 2.0, false)).await?;
    store.submit_metric(&metric("sha2", "cpu", 9.0, false)).await?;
    store.submit_metric(&metric("sha1", "cpu", 3.0, false)).await?;

    let rows = store.metrics_for_commit("sha1").await?;
    let seen = rows
        .iter()
        .map(|row| (row.name.as_str(), row.value))
        .collect::<Vec<_>>();
    assert_eq!(seen, vec![("mem", 2.0), ("cpu", 3.0)]);

    assert!(store.metrics_for_commit("unknown").await?.is_empty());
    Ok(())
}

async fn latest_reference_is_returned(
    store: &dyn Storage,
) -> Result<(), Box<dyn std::error::Error>> {
    assert_eq!(store.reference_for_metric("cpu").await?, None);

    store.submit_metric(&metric("ref1", "cpu", 10.0, true)).await?;
    store.submit_metric(&metric("ref2", "cpu", 12.0, true)).await?;
    store.submit_metric(&metric("pr1", "cpu", 99.0, false)).await?;
    store.submit_metric(&metric("ref3", "mem", 1.0, true)).await?;

    let reference = store
        .reference_for_metric("cpu")
        .await?
        .ok_or("missing reference")?;
    assert_eq!(reference.commit_sha, "ref2");
    assert_eq!(reference.value, 12.0);
    assert!(reference.is_reference);
    Ok(())
}

async fn fields_round_trip(store: &dyn Storage) -> Result<(), Box<dyn std::error::Error>> {
    let stored = Metric {
        commit_sha: "0123456789abcdef0123456789abcdef01234567".to_owned(),
        name: "bundle_size".to_owned(),
        value: -0.25,
        units: "KB".to_owned(),
        threshold: 1.5,
        is_reference: false,
        is_increase_bad: false,
    };
    store.submit_metric(&stored).await?;

    let rows = store.metrics_for_commit(&stored.commit_sha).await?;
    assert_eq!(rows, vec![stored]);
    Ok(())
}

#[tokio::test]
async fn sqlite_store_honours_query_contract() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    latest_row_per_name_wins(&SqliteStore::open(temp.path().join("a.sqlite"))?).await?;
    latest_reference_is_returned(&SqliteStore::open(temp.path().join("b.sqlite"))?).await?;
    fields_round_trip(&SqliteStore::open(temp.path().join("c.sqlite"))?).await?;
    Ok(())
}

#[tokio::test]
async fn memory_store_honours_query_contract() -> Result<(), Box<dyn std::error::Error>> {
    latest_row_per_name_wins(&MemoryStore::new()).await?;
    latest_reference_is_returned(&MemoryStore::new()).await?;
    fields_round_trip(&MemoryStore::new()).await?;
    Ok(())
}
