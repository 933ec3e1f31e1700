use anyhow::Error;
use tracing::info;

/// Delivers verification links to submitters.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, email: &str, link: &str, summary: &str) -> Result<(), Error>;
}

/// Writes the link to the log instead of sending mail.
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, email: &str, link: &str, summary: &str) -> Result<(), Error> {
        info!(%email, %link, "Verification requested for {summary}");
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;

    /// Keeps every sent link; fails every send when `failing`.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String)>>,
        pub failing: bool,
    }

    impl RecordingMailer {
        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        pub fn last_token(&self) -> Option<String> {
            let sent = self.sent.lock().unwrap();
            let (_, link) = sent.last()?;
            link.split("token=").nth(1).map(str::to_string)
        }
    }

    #[async_trait::async_trait]
    impl Mailer for RecordingMailer {
        async fn send_verification(&self, email: &str, link: &str, _summary: &str) -> Result<(), Error> {
            if self.failing {
                return Err(anyhow!("smtp unavailable"));
            }

            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), link.to_string()));
            Ok(())
        }
    }
}
