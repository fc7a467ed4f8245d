//! User-facing success/failure reports

/// Block explorer link for a transaction signature
pub fn explorer_url(signature: &str) -> String {
    format!("https://explorer.solana.com/tx/{}", signature)
}

pub trait Notifier: Send + Sync {
    fn success(&self, title: &str, detail: &str);

    fn failure(&self, title: &str, detail: &str);

    fn info(&self, title: &str, detail: &str) {
        log::info!("{}: {}", title, detail);
    }
}

/// Reports through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, title: &str, detail: &str) {
        log::info!("{}: {}", title, detail);
    }

    fn failure(&self, title: &str, detail: &str) {
        log::error!("{}: {}", title, detail);
    }
}
