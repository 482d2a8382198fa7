use crate::clients::bearer;
use crate::error::Error;
use crate::record::{ReportRequest, ReportResponse};
use google_cloud_token::TokenSource;
use reqwest::{header::AUTHORIZATION, Client, Url};
use std::sync::Arc;

const DEFAULT_API_URL: &str = "https://analyticsdata.googleapis.com";

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReportingApi: Send + Sync + 'static {
    /// Runs a single report query.
    /// # Arguments
    /// * `request` - The report to run, including the target property.
    /// # Returns
    /// A Result containing either the first (and only requested) page of rows or an Error.
    async fn run_report(&self, request: &ReportRequest) -> Result<ReportResponse, Error>;
}

/// Google Analytics Data API (v1beta) client
#[derive(Clone)]
pub struct Ga4Client {
    client: Client,
    base_url: String,
    token_source: Arc<dyn TokenSource>,
}

impl Ga4Client {
    pub fn new(token_source: Arc<dyn TokenSource>) -> Self {
        Self::with_base_url(token_source, DEFAULT_API_URL)
    }

    pub fn with_base_url(token_source: Arc<dyn TokenSource>, base_url: &str) -> Self {
        Ga4Client {
            client: Client::new(),
            base_url: base_url.to_string(),
            token_source,
        }
    }

    fn report_url(&self, property_id: &str) -> Result<Url, Error> {
        let method = format!("{}:runReport", property_id);

        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(&["v1beta", "properties", method.as_str()]);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl ReportingApi for Ga4Client {
    async fn run_report(&self, request: &ReportRequest) -> Result<ReportResponse, Error> {
        let url = self.report_url(&request.property_id)?;
        let auth = bearer(self.token_source.as_ref()).await?;

        let resp = self
            .client
            .post(url)
            .header(AUTHORIZATION, auth)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::ApiFailure {
                api: "Analytics Data API",
                status,
                body: resp.text().await.unwrap_or_default(),
            });
        }

        Ok(resp.json::<ReportResponse>().await?)
    }
}
