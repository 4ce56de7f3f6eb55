//! Renders orchestrator events as terminal notices.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use texgen_client::events::{Notice, NoticeLevel, TextureEvent};

pub(crate) fn render(notice: &Notice) -> String {
    let marker = match notice.level {
        NoticeLevel::Info => "→",
        NoticeLevel::Success => "✔",
        NoticeLevel::Warning => "!",
        NoticeLevel::Error => "✘",
    };
    match &notice.description {
        Some(description) => format!("{marker} {}: {description}", notice.title),
        None => format!("{marker} {}", notice.title),
    }
}

/// Print notices until the bus closes.
pub(crate) async fn run(mut events: broadcast::Receiver<TextureEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(notice) = event.notice() {
                    eprintln!("{}", render(&notice));
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use texgen_core::job::JobKind;
    use texgen_core::types::JobId;

    #[test]
    fn renders_title_and_description() {
        let failed = TextureEvent::JobFailed {
            job_id: JobId::from("j1"),
            kind: JobKind::Generation,
        };
        assert_eq!(
            render(&failed.notice().unwrap()),
            "✘ Generation failed: Please try again with a different prompt."
        );

        let downloaded = TextureEvent::Downloaded {
            job_id: JobId::from("j1"),
            bytes: 3,
        };
        assert_eq!(render(&downloaded.notice().unwrap()), "✔ Texture downloaded successfully");

        let sign_in = TextureEvent::SignInRequired {
            action: "download".into(),
        };
        assert_eq!(render(&sign_in.notice().unwrap()), "→ Sign in required: Sign in to download");
    }
}
