//! Blocking SPARQL protocol client for the query endpoint.
//!
//! Queries are validated locally with Oxigraph's parser before they are
//! sent, so malformed query text never reaches the endpoint. Results are
//! read as `application/sparql-results+json`.

use crate::error::{AdapterError, Result};
use oxigraph::sparql::SparqlEvaluator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// One bound RDF term in the SPARQL JSON results format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdfTerm {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsHead {
    #[serde(default)]
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsBody {
    pub bindings: Vec<BTreeMap<String, RdfTerm>>,
}

/// A SELECT or ASK result document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparqlResults {
    #[serde(default)]
    pub head: ResultsHead,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean: Option<bool>,
}

impl SparqlResults {
    pub fn row_count(&self) -> usize {
        match (&self.results, self.boolean) {
            (Some(body), _) => body.bindings.len(),
            (None, Some(_)) => 1,
            (None, None) => 0,
        }
    }

    /// Rows as `variable -> value` maps, dropping term kinds.
    pub fn rows(&self) -> Vec<BTreeMap<String, String>> {
        self.results
            .iter()
            .flat_map(|body| body.bindings.iter())
            .map(|row| row.iter().map(|(var, term)| (var.clone(), term.value.clone())).collect())
            .collect()
    }

    /// Serialized form handed to evaluation storage.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Reject query text that does not parse as SPARQL.
pub fn validate_query(query: &str) -> Result<()> {
    SparqlEvaluator::new()
        .parse_query(query)
        .map(|_| ())
        .map_err(|e| AdapterError::QueryExecution(format!("malformed query: {}", e)))
}

pub struct SparqlClient {
    client: reqwest::blocking::Client,
    url: String,
}

impl SparqlClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.to_string() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Validate, send and decode one query.
    pub fn query(&self, query: &str) -> Result<SparqlResults> {
        validate_query(query)?;
        debug!(url = %self.url, "sending query");
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, SPARQL_RESULTS_JSON)
            .form(&[("query", query)])
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AdapterError::QueryExecution(format!(
                "endpoint answered {}: {}",
                status, body
            )));
        }

        Ok(response.json::<SparqlResults>()?)
    }
}
