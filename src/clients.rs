use crate::config::Config;
use crate::error::Error;
use crate::report_client::Ga4Client;
use crate::warehouse::BigQueryClient;
use google_cloud_auth::project::Config as AuthConfig;
use google_cloud_auth::token::DefaultTokenSourceProvider;
use google_cloud_token::{TokenSource, TokenSourceProvider};
use log::info;

const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/analytics.readonly",
    "https://www.googleapis.com/auth/bigquery.insertdata",
];

/// Long-lived API clients, built once per process and shared by every run.
pub struct Clients {
    pub reporting: Ga4Client,
    pub warehouse: BigQueryClient,
}

impl Clients {
    /// Resolves application default credentials and builds both clients around them.
    pub async fn init(config: &Config) -> Result<Self, Error> {
        let provider = DefaultTokenSourceProvider::new(AuthConfig::default().with_scopes(&SCOPES))
            .await?;
        info!("Resolved default credentials");

        let token_source = provider.token_source();

        Ok(Clients {
            reporting: Ga4Client::new(token_source.clone()),
            warehouse: BigQueryClient::new(token_source, &config.bq_project_id),
        })
    }
}

/// Returns the `Authorization` header value for the next request.
pub(crate) async fn bearer(token_source: &dyn TokenSource) -> Result<String, Error> {
    token_source
        .token()
        .await
        .map_err(|err| Error::Credentials {
            message: err.to_string(),
        })
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use google_cloud_token::TokenSource;
    use std::sync::Arc;

    #[derive(Debug)]
    pub struct StaticToken;

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn token(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Ok("Bearer test-token".to_string())
        }
    }

    pub fn static_token() -> Arc<dyn TokenSource> {
        Arc::new(StaticToken)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::static_token;
    use super::*;

    #[tokio::test]
    async fn test_bearer_header() {
        let token_source = static_token();
        let header = bearer(token_source.as_ref()).await.unwrap();
        assert_eq!(header, "Bearer test-token");
    }
}
