use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pressreview::models::{CrawlerConfig, Section, SectionFormat};
use pressreview::pipeline::crawl_sections;
use pressreview::services::SectionHarvester;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const FRONT_PAGE: &str = r#"
<html><body>
  <h2><a class="story" href="/world/1">  Floods hit   the coast </a></h2>
  <h2><a class="story" href="">No link here</a></h2>
  <h2><a class="story" href="https://other.example/2">Markets rally</a></h2>
  <h2><a class="story" href="/world/3"></a></h2>
  <h2><a class="story" href="/world/4">Election called</a></h2>
</body></html>
"#;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Wire</title>
  <item><title>First wire story</title><link>https://wire.example/a</link></item>
  <item><title>Second wire story</title><link>https://wire.example/b</link></item>
  <item><title>Third wire story</title><link>https://wire.example/c</link></item>
</channel></rss>
"#;

fn section(server: &MockServer, route: &str, format: SectionFormat) -> Section {
    Section {
        code: "front".into(),
        category: "latest".into(),
        channel: "daily".into(),
        format,
        source_url: format!("{}{}", server.uri(), route),
        pattern: "a.story".into(),
        link_attr: "href".into(),
    }
}

#[tokio::test]
async fn harvests_ranked_html_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/front"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FRONT_PAGE, "text/html"))
        .mount(&server)
        .await;

    let harvester = SectionHarvester::new(&CrawlerConfig::default()).unwrap();
    let items = harvester
        .harvest(&section(&server, "/front", SectionFormat::Html))
        .await
        .unwrap();

    let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, ["Floods hit the coast", "Markets rally", "Election called"]);
    let positions: Vec<_> = items.iter().map(|i| i.position).collect();
    assert_eq!(positions, [1, 2, 3]);
    assert_eq!(items[0].link, format!("{}/world/1", server.uri()));
    assert_eq!(items[1].link, "https://other.example/2");
    assert!(items.iter().all(|i| i.channel == "daily" && i.section == "latest"));
}

#[tokio::test]
async fn harvests_feed_with_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FEED, "application/rss+xml"))
        .mount(&server)
        .await;

    let harvester = SectionHarvester::new(&CrawlerConfig::default())
        .unwrap()
        .with_limit(2);
    let items = harvester
        .harvest(&section(&server, "/feed.xml", SectionFormat::Rss))
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title, "First wire story");
    assert_eq!(items[1].link, "https://wire.example/b");
    assert_eq!(items[1].position, 2);
}

#[tokio::test]
async fn server_error_fails_the_section() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let harvester = SectionHarvester::new(&CrawlerConfig::default()).unwrap();
    let result = harvester
        .harvest(&section(&server, "/broken", SectionFormat::Html))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn empty_source_url_yields_nothing() {
    let harvester = SectionHarvester::new(&CrawlerConfig::default()).unwrap();
    let items = harvester.harvest(&Section::adhoc("", "a")).await.unwrap();
    assert!(items.is_empty());
}

/// Records when each request reaches the server, then answers slowly.
struct SlowPage {
    arrivals: Arc<Mutex<Vec<Instant>>>,
    delay: Duration,
}

impl Respond for SlowPage {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(200)
            .set_body_raw(FRONT_PAGE, "text/html")
            .set_delay(self.delay)
    }
}

#[tokio::test]
async fn same_host_requests_respect_the_domain_ceiling() {
    let server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let delay = Duration::from_millis(200);
    Mock::given(method("GET"))
        .respond_with(SlowPage {
            arrivals: Arc::clone(&arrivals),
            delay,
        })
        .mount(&server)
        .await;

    let config = CrawlerConfig {
        per_domain_concurrency: 2,
        ..CrawlerConfig::default()
    };
    let harvester = SectionHarvester::new(&config).unwrap();
    let sections: Vec<Section> = (0..6)
        .map(|i| section(&server, &format!("/page/{i}"), SectionFormat::Html))
        .collect();

    let started = Instant::now();
    let outcome = crawl_sections(&harvester, sections, 6).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.section_failures, 0);
    assert_eq!(outcome.items.len(), 18);
    // Six requests, two at a time: three full rounds of the delay.
    assert!(elapsed >= delay * 3, "finished in {elapsed:?}");

    let mut arrivals = arrivals.lock().unwrap().clone();
    arrivals.sort();
    assert_eq!(arrivals.len(), 6);
    for (i, first) in arrivals.iter().enumerate() {
        let in_flight = arrivals[i..]
            .iter()
            .take_while(|at| at.duration_since(*first) < delay * 3 / 4)
            .count();
        assert!(in_flight <= 2, "{in_flight} requests started together");
    }
}
