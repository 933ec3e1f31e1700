use std::time::Duration;

use anyhow::{Context, Error};
use reqwest::{Client, Url};
use tracing::warn;

/// Optional lookup of proposed model ids against an external model hub.
pub struct ModelCatalog {
    base_url: Option<Url>,
    client: Client,
}

impl ModelCatalog {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url
            .map(|url| Url::parse(&url).with_context(|| format!("invalid catalog url {url}")))
            .transpose()?;

        Ok(Self { base_url, client })
    }

    pub fn disabled() -> Self {
        Self {
            base_url: None,
            client: Client::new(),
        }
    }

    /// Returns a warning when the model could not be confirmed. Never fails.
    pub async fn check(&self, model_id: &str) -> Option<String> {
        let base_url = self.base_url.as_ref()?;
        let Some(url) = lookup_url(base_url, model_id) else {
            warn!("Catalog url {base_url} cannot take a model path");
            return Some(format!("Could not confirm {model_id} in the model catalog"));
        };

        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => None,
            Ok(response) => {
                warn!("Catalog lookup for {model_id} returned {}", response.status());
                Some(format!("{model_id} was not found in the model catalog"))
            }
            Err(e) => {
                warn!("Catalog lookup for {model_id} failed: {e}");
                Some(format!("Could not confirm {model_id} in the model catalog"))
            }
        }
    }
}

/// `{base}/{org}/{name}` with every segment percent-encoded.
fn lookup_url(base: &Url, model_id: &str) -> Option<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .extend(model_id.split('/'));

    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_catalog_never_warns() {
        assert_eq!(ModelCatalog::disabled().check("org/model").await, None);
    }

    #[tokio::test]
    async fn test_unreachable_catalog_warns() {
        let catalog =
            ModelCatalog::new(Some("http://127.0.0.1:9/".to_string()), Duration::from_millis(500)).unwrap();

        let warning = catalog.check("org/model").await.unwrap();
        assert!(warning.contains("org/model"));
    }

    #[test]
    fn test_lookup_url_escapes_model_id() {
        let base = Url::parse("https://hub.example.org/api/models/").unwrap();

        assert_eq!(
            lookup_url(&base, "org/model-7B").unwrap().as_str(),
            "https://hub.example.org/api/models/org/model-7B"
        );
        assert_eq!(
            lookup_url(&base, "org/m?x#y z").unwrap().as_str(),
            "https://hub.example.org/api/models/org/m%3Fx%23y%20z"
        );
    }

    #[test]
    fn test_invalid_catalog_url() {
        assert!(ModelCatalog::new(Some("not a url".to_string()), Duration::from_secs(1)).is_err());
    }
}
