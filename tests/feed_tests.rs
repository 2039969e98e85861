use dealwatch::models::RawListing;
use dealwatch::services::feed_monitor::newest_timestamp;
use dealwatch::services::listing_feed::FeedPage;
use serde_json::json;

#[test]
fn feed_page_shapes_are_flattened() {
    let bare: FeedPage = serde_json::from_value(json!([{ "id": "a" }, { "id": "b" }])).unwrap();
    assert_eq!(bare.into_listings().len(), 2);

    let hits: FeedPage = serde_json::from_value(json!({ "hits": [{ "id": "a" }], "nbHits": 1 })).unwrap();
    assert_eq!(hits.into_listings().len(), 1);

    let listings: FeedPage = serde_json::from_value(json!({ "listings": [] })).unwrap();
    assert!(listings.into_listings().is_empty());
}

#[test]
fn newest_timestamp_ignores_unusable_records() {
    let page = vec![
        RawListing::from(json!({ "id": "a", "title": "t", "timestamp": 1_700_000_000 })),
        RawListing::from(json!({ "id": "b", "title": "t", "updatedAt": "2024-05-01T12:00:00Z" })),
        RawListing::from(json!({ "title": "no id", "timestamp": 1_900_000_000 })),
        RawListing::from(json!({ "id": "c", "title": "t" })),
    ];

    assert_eq!(newest_timestamp(&page), Some(1_714_564_800_000));
    assert_eq!(newest_timestamp(&[]), None);
}
