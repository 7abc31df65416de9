use std::sync::{Arc, Once};
use std::time::Duration;

use pretty_assertions::assert_eq;
use sweep_core::{Pacing, Phase, MISSING_TITLE};
use sweep_engine::{
    HostError, LoadError, MemoryStore, PageSource, PanelError, RawPage, RetryPolicy,
    StartOutcome, SweepEngine, SweepSettings,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(sweep_logging::initialize_for_tests);
}

fn fast_settings() -> SweepSettings {
    SweepSettings {
        pacing: Pacing {
            base_delay: Duration::from_millis(20),
            per_item_overhead: Duration::from_millis(5),
        },
        settle_delay: Duration::from_millis(10),
        close_delay: Duration::from_millis(10),
        retry: RetryPolicy {
            reply_timeout: Duration::from_secs(2),
            retry_delay: Duration::from_millis(20),
        },
        poll_interval: Duration::from_millis(25),
        ..SweepSettings::default()
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><body>{body}</body></html>"),
        "text/html; charset=utf-8",
    )
}

fn detail(title: &str, status: &str) -> ResponseTemplate {
    html(&format!(
        r#"<h1 data-testid="issue.views.issue-base.foundation.summary.heading">{title}</h1>
           <button data-testid="issue-field-status.ui.status-view.status-button.status-button">{status}</button>"#
    ))
}

async fn mount(server: &MockServer, at: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn listing_run_collects_one_record_per_link() {
    init_logging();
    let server = MockServer::start().await;
    mount(
        &server,
        "/issues",
        html(
            r#"<a href="/browse/PRJ-1">1</a>
               <a href="/browse/PRJ-2">2</a>
               <a href="/browse/PRJ-3">3</a>
               <a href="/settings">not a detail page</a>"#,
        ),
    )
    .await;
    mount(&server, "/browse/PRJ-1", detail("First", "Done")).await;
    mount(&server, "/browse/PRJ-2", detail("Second", "QA Review")).await;
    mount(&server, "/browse/PRJ-3", ResponseTemplate::new(500)).await;

    let engine = SweepEngine::new(fast_settings(), MemoryStore::new()).unwrap();
    let panel = engine.panel();
    let listing = panel
        .open_listing(&format!("{}/issues", server.uri()))
        .await
        .unwrap();
    assert!(engine.host().is_script_installed(listing));

    assert_eq!(panel.link_count(listing).await.unwrap(), 3);
    assert_eq!(
        panel.start(listing, 2).await.unwrap(),
        StartOutcome::Started {
            total: 3,
            batch_size: 2
        }
    );

    let status = tokio::time::timeout(Duration::from_secs(10), panel.wait_until_settled(|_| {}))
        .await
        .expect("run settles")
        .unwrap();
    assert_eq!(status.run.phase, Phase::Completed);
    assert_eq!(status.run.processed_count, 3);
    assert_eq!(status.record_count, 3);
    assert_eq!(status.pending, 0);

    let mut records = engine.store().records().unwrap();
    records.sort_by(|a, b| a.address.cmp(&b.address));
    assert_eq!(records[0].title, "First");
    assert_eq!(records[1].status, "QA Review");
    // A page that failed to load still reports, with sentinels.
    assert!(records[2].address.ends_with("/browse/PRJ-3"));
    assert_eq!(records[2].title, MISSING_TITLE);

    // Detail contexts close themselves; only the listing remains.
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.host().open_count() > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("detail contexts close");
    assert!(engine.host().is_script_installed(listing));
}

#[tokio::test]
async fn listing_without_links_starts_nothing() {
    init_logging();
    let server = MockServer::start().await;
    mount(&server, "/issues", html("<p>No issues match.</p>")).await;

    let engine = SweepEngine::new(fast_settings(), MemoryStore::new()).unwrap();
    let panel = engine.panel();
    let listing = panel
        .open_listing(&format!("{}/issues", server.uri()))
        .await
        .unwrap();

    assert_eq!(panel.start(listing, 5).await.unwrap(), StartOutcome::NothingFound);
    let status = panel.status().await.unwrap();
    assert_eq!(status.run.phase, Phase::Idle);
    assert_eq!(status.run.total_expected, 0);
    assert_eq!(engine.host().open_count(), 1);
}

#[tokio::test]
async fn operator_opened_detail_page_is_not_extracted() {
    init_logging();
    let server = MockServer::start().await;
    mount(&server, "/browse/PRJ-1", detail("First", "Done")).await;

    let engine = SweepEngine::new(fast_settings(), MemoryStore::new()).unwrap();
    let panel = engine.panel();
    let context = panel
        .open_listing(&format!("{}/browse/PRJ-1", server.uri()))
        .await
        .unwrap();

    // The page script answers; the extractor never ran.
    assert_eq!(panel.link_count(context).await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(panel.status().await.unwrap().record_count, 0);
    assert_eq!(engine.host().open_count(), 1);
}

#[tokio::test]
async fn unreachable_listing_is_an_actionable_error() {
    init_logging();
    let server = MockServer::start().await;
    mount(&server, "/issues", ResponseTemplate::new(503)).await;

    let engine = SweepEngine::new(fast_settings(), MemoryStore::new()).unwrap();
    let panel = engine.panel();
    let err = panel
        .open_listing(&format!("{}/issues", server.uri()))
        .await
        .unwrap_err();

    assert!(
        matches!(err, PanelError::Host(HostError::LoadFailed { .. })),
        "got {err:?}"
    );
    assert_eq!(panel.status().await.unwrap().run.phase, Phase::Idle);
}

/// Serves one fixed listing after a delay.
struct SlowSource {
    delay: Duration,
}

#[async_trait::async_trait]
impl PageSource for SlowSource {
    async fn fetch(&self, address: &Url) -> Result<RawPage, LoadError> {
        tokio::time::sleep(self.delay).await;
        Ok(RawPage {
            final_address: address.clone(),
            content_type: Some("text/html".to_string()),
            bytes: br#"<a href="/browse/PRJ-7">7</a>"#.to_vec(),
        })
    }
}

#[tokio::test]
async fn open_listing_returns_once_the_page_script_is_in_place() {
    init_logging();
    let source = Arc::new(SlowSource {
        delay: Duration::from_millis(300),
    });
    let engine = SweepEngine::with_source(fast_settings(), MemoryStore::new(), source).unwrap();
    let panel = engine.panel();

    let listing = panel
        .open_listing("https://tracker.test/issues")
        .await
        .unwrap();
    assert!(engine.host().is_script_installed(listing));
    assert_eq!(panel.link_count(listing).await.unwrap(), 1);
}

#[tokio::test]
async fn clear_after_run_returns_to_idle() {
    init_logging();
    let server = MockServer::start().await;
    mount(&server, "/issues", html(r#"<a href="/browse/PRJ-1">1</a>"#)).await;
    mount(&server, "/browse/PRJ-1", detail("Only", "Done")).await;

    let engine = SweepEngine::new(fast_settings(), MemoryStore::new()).unwrap();
    let panel = engine.panel();
    let listing = panel
        .open_listing(&format!("{}/issues", server.uri()))
        .await
        .unwrap();
    panel.start(listing, 5).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), panel.wait_until_settled(|_| {}))
        .await
        .expect("run settles")
        .unwrap();

    panel.clear().await.unwrap();
    let status = panel.status().await.unwrap();
    assert_eq!(status.run.phase, Phase::Idle);
    assert_eq!(status.run.processed_count, 0);
    assert_eq!(status.record_count, 0);
}
