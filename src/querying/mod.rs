pub mod sparql_client;

pub use sparql_client::{validate_query, RdfTerm, SparqlClient, SparqlResults};
