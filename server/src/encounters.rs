//! Appointment service client.

use dispensary_core::EncounterId;
use dispensary_core::encounter::{EncounterDirectory, EncounterLookupError};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// [`EncounterDirectory`] backed by `GET {base_url}/appointments/{id}`.
///
/// 2xx means the encounter exists and 404 means it does not. Anything else,
/// including a timeout, is an [`EncounterLookupError`].
#[derive(Clone, Debug)]
pub struct HttpEncounterDirectory {
    client: Client,
    base_url: String,
}

impl HttpEncounterDirectory {
    /// Create a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, id: EncounterId) -> String {
        format!("{}/appointments/{id}", self.base_url)
    }
}

impl EncounterDirectory for HttpEncounterDirectory {
    fn encounter_exists(
        &self,
        id: EncounterId,
    ) -> Pin<Box<dyn Future<Output = Result<bool, EncounterLookupError>> + Send + '_>> {
        Box::pin(async move {
            let response = self.client.get(self.url(id)).send().await.map_err(|e| {
                if e.is_timeout() {
                    EncounterLookupError::Timeout
                } else {
                    EncounterLookupError::Transport(e.to_string())
                }
            })?;

            match response.status() {
                status if status.is_success() => Ok(true),
                StatusCode::NOT_FOUND => Ok(false),
                status => {
                    tracing::warn!(
                        encounter_id = %id,
                        status = status.as_u16(),
                        "Appointment service returned an unexpected status"
                    );
                    Err(EncounterLookupError::UnexpectedStatus(status.as_u16()))
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_id() {
        let directory =
            HttpEncounterDirectory::new("http://appointments:8005/", Duration::from_secs(1))
                .unwrap();
        let id = EncounterId::new();

        assert_eq!(
            directory.url(id),
            format!("http://appointments:8005/appointments/{id}")
        );
    }
}
