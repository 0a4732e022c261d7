mod support;

use catmaid_fetch::cache::{RequestKey, ResponseCache};
use catmaid_fetch::CatmaidInstance;
use std::time::Duration;
use support::{instance, FakeEndpoint};

#[tokio::test]
async fn test_saved_cache_answers_a_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catmaid-cache.json");

    let endpoint = FakeEndpoint::new();
    let rm = instance(&endpoint);
    rm.fetch_json_many(vec!["https://catmaid.test/a", "https://catmaid.test/b"])
        .await
        .unwrap();
    rm.save_cache(&path).unwrap();

    let other = FakeEndpoint::new();
    let restored = instance(&other);
    restored.load_cache(&path).unwrap();

    let a = restored.fetch_json("https://catmaid.test/a").await.unwrap();
    assert_eq!(a["url"], "https://catmaid.test/a");
    assert_eq!(other.calls(), 0);
    assert_eq!(restored.cache_size_bytes().unwrap(), rm.cache_size_bytes().unwrap());
}

#[tokio::test]
async fn test_loaded_cache_keeps_order_and_drops_time_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut cache = ResponseCache::new(Some(1024), Some(Duration::from_secs(60)));
    for n in 0..4 {
        let url = format!("https://catmaid.test/{}", n);
        cache.insert(RequestKey::get(&url), format!("[{}]", n).into(), 200, url);
    }
    cache.save(&path).unwrap();

    let loaded = ResponseCache::load(&path).unwrap();
    assert_eq!(loaded.size_limit(), Some(1024));
    assert_eq!(loaded.time_limit(), None);
    let urls: Vec<&str> = loaded.entries().map(|e| e.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://catmaid.test/0",
            "https://catmaid.test/1",
            "https://catmaid.test/2",
            "https://catmaid.test/3",
        ]
    );

    // A restored cache can seed a new session directly.
    let endpoint = FakeEndpoint::new();
    let rm = CatmaidInstance::builder()
        .endpoint(endpoint.clone())
        .with_cache(loaded)
        .build()
        .unwrap();
    let v = rm.fetch_json("https://catmaid.test/2").await.unwrap();
    assert_eq!(v, serde_json::json!([2]));
    assert_eq!(endpoint.calls(), 0);
}

#[test]
fn test_save_leaves_no_temp_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");

    ResponseCache::unlimited().save(&path).unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["cache.json".to_string()]);
}
