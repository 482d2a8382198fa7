use crate::clients::bearer;
use crate::config::TablePath;
use crate::error::Error;
use crate::record::OutputRecord;
use google_cloud_token::TokenSource;
use log::{error, info};
use reqwest::{header::AUTHORIZATION, Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_API_URL: &str = "https://bigquery.googleapis.com";
const USER_PROJECT_HEADER: &str = "x-goog-user-project";

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync + 'static {
    /// Streams a batch of records into the table in a single call.
    /// # Arguments
    /// * `table` - The fully-qualified destination table.
    /// * `rows` - The records to append.
    /// # Returns
    /// The per-row errors reported by the warehouse (empty when every row landed),
    /// or an Error when the call itself failed.
    async fn insert_rows(
        &self,
        table: &TablePath,
        rows: &[OutputRecord],
    ) -> Result<Vec<InsertError>, Error>;
}

/// A rejected row as reported by `tabledata.insertAll`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsertError {
    pub index: u32,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
struct InsertAllRequest<'a> {
    rows: Vec<InsertRow<'a>>,
}

/// `insertId` lets BigQuery drop a row it has already seen, on a best-effort basis.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRow<'a> {
    insert_id: String,
    json: &'a OutputRecord,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertError>,
}

/// BigQuery streaming-insert client
#[derive(Clone)]
pub struct BigQueryClient {
    client: Client,
    base_url: String,
    project_id: String,
    token_source: Arc<dyn TokenSource>,
}

impl BigQueryClient {
    pub fn new(token_source: Arc<dyn TokenSource>, project_id: &str) -> Self {
        Self::with_base_url(token_source, project_id, DEFAULT_API_URL)
    }

    pub fn with_base_url(
        token_source: Arc<dyn TokenSource>,
        project_id: &str,
        base_url: &str,
    ) -> Self {
        BigQueryClient {
            client: Client::new(),
            base_url: base_url.to_string(),
            project_id: project_id.to_string(),
            token_source,
        }
    }

    fn insert_url(&self, table: &TablePath) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(&[
                "bigquery",
                "v2",
                "projects",
                table.project.as_str(),
                "datasets",
                table.dataset.as_str(),
                "tables",
                table.table.as_str(),
                "insertAll",
            ]);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Warehouse for BigQueryClient {
    async fn insert_rows(
        &self,
        table: &TablePath,
        rows: &[OutputRecord],
    ) -> Result<Vec<InsertError>, Error> {
        let url = self.insert_url(table)?;
        let auth = bearer(self.token_source.as_ref()).await?;
        let body = InsertAllRequest {
            rows: rows
                .iter()
                .map(|json| InsertRow {
                    insert_id: Uuid::new_v4().to_string(),
                    json,
                })
                .collect(),
        };

        let resp = self
            .client
            .post(url)
            .header(AUTHORIZATION, auth)
            .header(USER_PROJECT_HEADER, &self.project_id)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::ApiFailure {
                api: "BigQuery",
                status,
                body: resp.text().await.unwrap_or_default(),
            });
        }

        Ok(resp.json::<InsertAllResponse>().await?.insert_errors)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(usize),
    Rejected(Vec<InsertError>),
    Failed(String),
}

/// Loads one day's batch. Never fails: rejected rows and transport errors are logged and
/// reported back as an [`InsertOutcome`], and the rows are not retried.
pub async fn insert_batch(
    warehouse: &dyn Warehouse,
    table: &TablePath,
    rows: &[OutputRecord],
) -> InsertOutcome {
    match warehouse.insert_rows(table, rows).await {
        Ok(errors) if errors.is_empty() => {
            info!("Successfully inserted {} rows into BigQuery.", rows.len());
            InsertOutcome::Inserted(rows.len())
        }
        Ok(errors) => {
            let payload = serde_json::to_string(&errors).unwrap_or_else(|_| format!("{:?}", errors));
            error!("BigQuery insertion errors: {}", payload);
            InsertOutcome::Rejected(errors)
        }
        Err(err) => {
            error!("Failed to insert data into BigQuery: {}", err);
            InsertOutcome::Failed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::test_support::static_token;
    use crate::record::{map_row, Row, RowOutcome};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::collections::HashSet;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn table() -> TablePath {
        TablePath {
            project: "acme-prod".to_string(),
            dataset: "analytics".to_string(),
            table: "ga4_daily".to_string(),
        }
    }

    fn record(transaction_id: &str) -> OutputRecord {
        let dims = [
            "2024-05-01",
            "desktop",
            "7",
            "Summer",
            "google/organic",
            transaction_id,
            "purchase",
        ];
        let metrics = ["1", "3", "12.5", "0", "1", "1", "12.5"];
        match map_row(&Row::new(&dims, &metrics)) {
            RowOutcome::Mapped(record) => record,
            RowOutcome::Skipped(reason) => panic!("fixture row skipped: {}", reason),
        }
    }

    const INSERT_PATH: &str =
        "/bigquery/v2/projects/acme-prod/datasets/analytics/tables/ga4_daily/insertAll";

    #[tokio::test]
    async fn test_insert_rows_posts_json_rows() {
        let server = MockServer::start().await;
        let rows = vec![record("TXN1"), record("TXN2")];

        Mock::given(method("POST"))
            .and(path(INSERT_PATH))
            .and(header("authorization", "Bearer test-token"))
            .and(header(USER_PROJECT_HEADER, "acme-prod"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"kind": "bigquery#tableDataInsertAllResponse"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = BigQueryClient::with_base_url(static_token(), "acme-prod", &server.uri());
        let errors = client.insert_rows(&table(), &rows).await.unwrap();
        assert!(errors.is_empty());

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        let sent = body["rows"].as_array().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["json"], serde_json::to_value(&rows[0]).unwrap());
        assert_eq!(sent[1]["json"]["transaction_id"], json!("TXN2"));

        let insert_ids: HashSet<&str> = sent
            .iter()
            .map(|row| row["insertId"].as_str().unwrap())
            .collect();
        assert_eq!(insert_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_rows_returns_row_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(INSERT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "insertErrors": [{
                    "index": 1,
                    "errors": [{"reason": "invalid", "location": "sessions", "message": "bad"}]
                }]
            })))
            .mount(&server)
            .await;

        let client = BigQueryClient::with_base_url(static_token(), "acme-prod", &server.uri());
        let errors = client
            .insert_rows(&table(), &[record("TXN1"), record("TXN2")])
            .await
            .unwrap();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, 1);
        assert_eq!(errors[0].errors[0].location, "sessions");
    }

    #[tokio::test]
    async fn test_insert_rows_table_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not found: Table"))
            .mount(&server)
            .await;

        let client = BigQueryClient::with_base_url(static_token(), "acme-prod", &server.uri());
        let result = client.insert_rows(&table(), &[record("TXN1")]).await;

        assert!(matches!(
            result.unwrap_err(),
            Error::ApiFailure { status, .. } if status == StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn test_insert_batch_success() {
        let mut warehouse = MockWarehouse::new();
        warehouse
            .expect_insert_rows()
            .times(1)
            .returning(|_, _| Ok(vec![]));

        let outcome = insert_batch(&warehouse, &table(), &[record("A"), record("B")]).await;
        assert_eq!(outcome, InsertOutcome::Inserted(2));
    }

    #[tokio::test]
    async fn test_insert_batch_rejected_rows_do_not_fail() {
        let mut warehouse = MockWarehouse::new();
        warehouse.expect_insert_rows().times(1).returning(|_, _| {
            Ok(vec![InsertError {
                index: 0,
                errors: vec![ErrorProto {
                    reason: "invalid".to_string(),
                    ..Default::default()
                }],
            }])
        });

        let outcome = insert_batch(&warehouse, &table(), &[record("A")]).await;
        assert!(matches!(outcome, InsertOutcome::Rejected(errors) if errors.len() == 1));
    }

    #[tokio::test]
    async fn test_insert_batch_transport_error_is_swallowed() {
        let mut warehouse = MockWarehouse::new();
        warehouse.expect_insert_rows().times(1).returning(|_, _| {
            Err(Error::Credentials {
                message: "token expired".to_string(),
            })
        });

        let outcome = insert_batch(&warehouse, &table(), &[record("A")]).await;
        assert!(matches!(outcome, InsertOutcome::Failed(message) if message.contains("token expired")));
    }
}
