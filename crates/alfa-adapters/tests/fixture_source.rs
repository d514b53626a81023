use alfa_adapters::{source_for, FetchContext, SourceSettings, FIXTURE_SOURCE_ID};
use alfa_core::EngagementCounters;
use alfa_storage::{HttpClientConfig, HttpFetcher};
use chrono::{TimeZone, Utc};
use uuid::Uuid;

#[tokio::test]
async fn fixture_batch_coerces_missing_counters_to_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engagement.json");
    std::fs::write(
        &path,
        r#"[
            {"id":"P1","title":"Sunset tee [SKU-00001]","board_id":"B1",
             "counters":{"impressions":5000,"saves":40,"clicks":200,"outbound_clicks":15}},
            {"id":"P2","title":"Stray","counters":{"impressions":null,"saves":3}},
            {"id":"P3"}
        ]"#,
    )
    .unwrap();

    let source = source_for(&SourceSettings::Fixture { path });
    assert_eq!(source.source_id(), FIXTURE_SOURCE_ID);

    let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
    let ctx = FetchContext {
        run_id: Uuid::nil(),
        now: Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).single().unwrap(),
    };
    let items = source.fetch_engagement(&http, &ctx).await.unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].counters.outbound_clicks, 15);
    assert_eq!(
        items[1].counters,
        EngagementCounters {
            impressions: 0,
            saves: 3,
            clicks: 0,
            outbound_clicks: 0
        }
    );
    assert_eq!(items[2].counters, EngagementCounters::default());
    assert_eq!(items[2].title, "");
}

#[tokio::test]
async fn missing_fixture_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = source_for(&SourceSettings::Fixture {
        path: dir.path().join("absent.json"),
    });
    let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
    let ctx = FetchContext {
        run_id: Uuid::nil(),
        now: Utc::now(),
    };
    assert!(source.fetch_engagement(&http, &ctx).await.is_err());
}
