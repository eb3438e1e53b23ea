//! Shared fixtures: sample documents in both wire formats and wiremock-backed systems
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sample_migration_verifier::{
    AsyncHttpClient, HttpClientConfig, IgnoreList, MigrationRun, PipelineSettings, RunContext,
    RunMode, RunSummary, SourceFormat, SystemEndpoint, SystemSide,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const RELEASE: &str = "2020-01-01T00:00:00+00:00";
pub const UPDATE: &str = "2021-06-30T12:00:00+00:00";

#[derive(Debug, Clone)]
pub struct FixtureAttribute {
    pub attribute_type: String,
    pub value: String,
    pub iris: Vec<String>,
}

/// A sample as both systems should serve it
#[derive(Debug, Clone)]
pub struct SampleFixture {
    pub accession: String,
    pub name: String,
    pub attributes: Vec<FixtureAttribute>,
    pub derived_from: Vec<String>,
}

impl SampleFixture {
    pub fn new(accession: &str) -> Self {
        Self {
            accession: accession.to_string(),
            name: format!("sample {}", accession),
            attributes: Vec::new(),
            derived_from: Vec::new(),
        }
    }

    pub fn attribute(mut self, attribute_type: &str, value: &str) -> Self {
        self.attributes.push(FixtureAttribute {
            attribute_type: attribute_type.to_string(),
            value: value.to_string(),
            iris: Vec::new(),
        });
        self
    }

    pub fn attribute_with_iris(mut self, attribute_type: &str, value: &str, iris: &[&str]) -> Self {
        self.attributes.push(FixtureAttribute {
            attribute_type: attribute_type.to_string(),
            value: value.to_string(),
            iris: iris.iter().map(|iri| iri.to_string()).collect(),
        });
        self
    }

    pub fn derived_from(mut self, target: &str) -> Self {
        self.derived_from.push(target.to_string());
        self
    }

    /// Legacy XML export; only the first IRI of an attribute can be expressed
    pub fn to_xml(&self) -> String {
        let mut properties = format!(
            r#"<Property class="Sample Name" characteristic="false" comment="false" type="STRING"><QualifiedValue><Value>{}</Value></QualifiedValue></Property>"#,
            self.name
        );
        for attribute in &self.attributes {
            let term = attribute
                .iris
                .first()
                .map(|iri| format!("<TermSourceREF><TermSourceID>{}</TermSourceID></TermSourceREF>", iri))
                .unwrap_or_default();
            properties.push_str(&format!(
                r#"<Property class="{}" characteristic="true" comment="false" type="STRING"><QualifiedValue><Value>{}</Value>{}</QualifiedValue></Property>"#,
                attribute.attribute_type, attribute.value, term
            ));
        }
        let derived: String = self
            .derived_from
            .iter()
            .map(|target| format!("<derivedFrom>{}</derivedFrom>", target))
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<BioSample xmlns="http://www.ebi.ac.uk/biosamples/SampleGroupExport/1.0" id="{}" submissionReleaseDate="{}" submissionUpdateDate="{}">{}{}</BioSample>"#,
            self.accession, RELEASE, UPDATE, properties, derived
        )
    }

    pub fn to_json(&self) -> String {
        let mut characteristics = serde_json::Map::new();
        for attribute in &self.attributes {
            let entry = characteristics
                .entry(attribute.attribute_type.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(values) = entry {
                let mut value = json!({ "text": attribute.value });
                if !attribute.iris.is_empty() {
                    value["ontologyTerms"] = json!(attribute.iris);
                }
                values.push(value);
            }
        }
        let relationships: Vec<Value> = self
            .derived_from
            .iter()
            .map(|target| {
                json!({ "source": self.accession, "type": "derived from", "target": target })
            })
            .collect();

        json!({
            "accession": self.accession,
            "name": self.name,
            "releaseDate": RELEASE,
            "updateDate": UPDATE,
            "characteristics": characteristics,
            "relationships": relationships,
        })
        .to_string()
    }

    pub fn body(&self, format: SourceFormat) -> String {
        match format {
            SourceFormat::Xml => self.to_xml(),
            SourceFormat::Json => self.to_json(),
        }
    }
}

pub fn xml_listing(ids: &[&str]) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            if id.starts_with("SAMEG") {
                format!(r#"<BioSampleGroup id="{}"/>"#, id)
            } else {
                format!(r#"<BioSample id="{}"/>"#, id)
            }
        })
        .collect();
    format!(
        "<ResultQuery><SummaryInfo><Total>{}</Total><From>1</From><To>{}</To></SummaryInfo>{}</ResultQuery>",
        ids.len(),
        ids.len(),
        items
    )
}

pub fn json_listing(collection: &str, ids: &[&str], number: usize, total_pages: usize) -> String {
    let items: Vec<Value> = ids.iter().map(|id| json!({ "accession": id })).collect();
    json!({
        "_embedded": { collection: items },
        "page": {
            "size": ids.len(),
            "totalElements": ids.len() * total_pages,
            "totalPages": total_pages,
            "number": number,
        }
    })
    .to_string()
}

pub fn listing(format: SourceFormat, collection: &str, ids: &[&str]) -> String {
    match format {
        SourceFormat::Xml => xml_listing(ids),
        SourceFormat::Json => json_listing(collection, ids, 0, 1),
    }
}

/// Serve a single-page sample inventory, an empty group inventory and every record
pub async fn mount_system(server: &MockServer, format: SourceFormat, samples: &[SampleFixture]) {
    let ids: Vec<&str> = samples.iter().map(|s| s.accession.as_str()).collect();

    Mock::given(method("GET"))
        .and(path("/samples"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(format, "samples", &ids)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(format, "groups", &[])))
        .mount(server)
        .await;

    for sample in samples {
        Mock::given(method("GET"))
            .and(path(format!("/samples/{}", sample.accession)))
            .respond_with(ResponseTemplate::new(200).set_body_string(sample.body(format)))
            .mount(server)
            .await;
    }
}

pub fn test_client() -> Arc<AsyncHttpClient> {
    let config = HttpClientConfig {
        timeout_seconds: 5,
        retry_attempts: 0,
        retry_delay_ms: 10,
        ..Default::default()
    };
    Arc::new(AsyncHttpClient::new(config).expect("client should build"))
}

pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        page_size: 100,
        queue_capacity: 8,
        backpressure_delay: Duration::from_millis(1),
        idle_poll: Duration::from_millis(10),
        max_in_flight: 4,
        ..Default::default()
    }
}

pub fn test_context(
    mode: RunMode,
    old: (&MockServer, SourceFormat),
    new: (&MockServer, SourceFormat),
    ignore_list: IgnoreList,
) -> RunContext {
    RunContext::new(
        mode,
        SystemEndpoint::new(SystemSide::Old, &old.0.uri(), old.1).expect("old endpoint"),
        SystemEndpoint::new(SystemSide::New, &new.0.uri(), new.1).expect("new endpoint"),
        test_settings(),
        ignore_list,
        test_client(),
    )
}

/// Crawl, intersect and compare an XML old system against a JSON new system
pub async fn run_full(old: &[SampleFixture], new: &[SampleFixture]) -> RunSummary {
    let old_server = MockServer::start().await;
    let new_server = MockServer::start().await;
    mount_system(&old_server, SourceFormat::Xml, old).await;
    mount_system(&new_server, SourceFormat::Json, new).await;

    let context = test_context(
        RunMode::Full,
        (&old_server, SourceFormat::Xml),
        (&new_server, SourceFormat::Json),
        IgnoreList::default(),
    );
    MigrationRun::new(context)
        .run()
        .await
        .expect("run should finish")
}
