//! Inventory crawls over real HTTP

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{json_listing, test_client, xml_listing};
use sample_migration_verifier::{
    AccessionId, AsyncHttpClient, HttpClientConfig, InventoryFetcher, Polled, QueueConsumer,
    SourceFormat, SystemEndpoint, SystemSide, bounded_queue,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn drain(mut consumer: QueueConsumer<AccessionId>) -> Vec<AccessionId> {
    let mut received = Vec::new();
    loop {
        match consumer.poll(Duration::from_millis(10)).await {
            Polled::Item(item) => received.push(item),
            Polled::Idle => continue,
            Polled::Finished => break,
        }
    }
    received.sort();
    received
}

fn ids(values: &[&str]) -> Vec<AccessionId> {
    values.iter().map(|v| AccessionId::new(*v)).collect()
}

#[tokio::test]
async fn test_json_crawl_walks_zero_based_pages() {
    let server = MockServer::start().await;
    let pages = [["SAMEA1", "SAMEA2"], ["SAMEA3", "SAMEA4"], ["SAMEA5", "SAMEA6"]];
    for (number, page) in pages.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path("/samples"))
            .and(query_param("page", number.to_string()))
            .and(query_param("size", "2"))
            .and(header("accept", "application/hal+json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(json_listing("samples", page, number, 3)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/groups"))
        .and(query_param("page", "0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(json_listing("groups", &["SAMEG1"], 0, 1)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = SystemEndpoint::new(SystemSide::New, &server.uri(), SourceFormat::Json).unwrap();
    let fetcher = InventoryFetcher::new(endpoint, test_client(), 2, 8);
    // Smaller than the inventory so the crawl has to wait on the consumer
    let (producer, consumer) = bounded_queue("new", 2, Duration::from_millis(1));

    let (pushed, received) = tokio::join!(fetcher.run(producer), drain(consumer));

    assert_eq!(pushed.unwrap(), 7);
    assert_eq!(
        received,
        ids(&["SAMEA1", "SAMEA2", "SAMEA3", "SAMEA4", "SAMEA5", "SAMEA6", "SAMEG1"])
    );
}

#[tokio::test]
async fn test_xml_crawl_walks_one_based_pages() {
    let server = MockServer::start().await;
    // Total of 3 with a page size of 2 makes two pages
    let first = "<ResultQuery><SummaryInfo><Total>3</Total></SummaryInfo>\
                 <BioSample id=\"SAMEA1\"/><BioSample id=\"SAMEA2\"/></ResultQuery>";
    let second = "<ResultQuery><SummaryInfo><Total>3</Total></SummaryInfo>\
                  <BioSample id=\"SAMEA3\"/></ResultQuery>";
    for (page, body) in [("1", first), ("2", second)] {
        Mock::given(method("GET"))
            .and(path("/samples"))
            .and(query_param("page", page))
            .and(query_param("pagesize", "2"))
            .and(query_param("query", ""))
            .and(header("accept", "text/xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_string(xml_listing(&[])))
        .mount(&server)
        .await;

    let endpoint = SystemEndpoint::new(SystemSide::Old, &server.uri(), SourceFormat::Xml).unwrap();
    let fetcher = InventoryFetcher::new(endpoint, test_client(), 2, 4);
    let (producer, consumer) = bounded_queue("old", 16, Duration::from_millis(1));

    let (pushed, received) = tokio::join!(fetcher.run(producer), drain(consumer));

    assert_eq!(pushed.unwrap(), 3);
    assert_eq!(received, ids(&["SAMEA1", "SAMEA2", "SAMEA3"]));
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/samples"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/samples"))
        .respond_with(ResponseTemplate::new(200).set_body_string(xml_listing(&["SAMEA1"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_string(xml_listing(&[])))
        .mount(&server)
        .await;

    let client = AsyncHttpClient::new(HttpClientConfig {
        timeout_seconds: 5,
        retry_attempts: 2,
        retry_delay_ms: 10,
        ..Default::default()
    })
    .unwrap();
    let endpoint = SystemEndpoint::new(SystemSide::Old, &server.uri(), SourceFormat::Xml).unwrap();
    let fetcher = InventoryFetcher::new(endpoint, Arc::new(client), 100, 4);
    let (producer, consumer) = bounded_queue("old", 16, Duration::from_millis(1));

    let (pushed, received) = tokio::join!(fetcher.run(producer), drain(consumer));

    assert_eq!(pushed.unwrap(), 1);
    assert_eq!(received, ids(&["SAMEA1"]));
}
