//! Operator alert rendering and hand-off.
//!
//! Delivery is at-most-once: a failed send is logged and never retried or
//! re-queued.

use std::sync::Arc;

use tracing::{info, warn};

use fudwatch_common::{FudAlert, ThreadMessage};

use crate::stats::SentinelStats;
use crate::traits::NotificationSink;
use crate::util::clip;

/// Max bytes of one quoted message in the thread excerpt.
const EXCERPT_MAX: usize = 240;

/// Render a confirmed verdict into the operator report. Deterministic:
/// the same alert always renders to the same text.
pub fn render_alert(alert: &FudAlert, link_base: &str) -> String {
    let verdict = &alert.verdict;
    let confidence = (verdict.fud_probability * 100.0).round() as u32;
    let source = if alert.from_cache {
        "cached verdict"
    } else {
        "fresh analysis"
    };

    let mut out = String::new();
    out.push_str("=== FUD Alert ===\n");
    out.push_str(&format!(
        "User:       @{} ({})\n",
        alert.user.handle, alert.user.display_name
    ));
    out.push_str(&format!("Risk:       {}\n", verdict.user_risk_level));
    out.push_str(&format!("Type:       {}\n", verdict.fud_type));
    out.push_str(&format!("Confidence: {confidence}%\n"));
    out.push_str(&format!("Source:     {source}\n"));
    out.push_str(&format!("Reason:     {}\n", verdict.decision_reason));

    if !verdict.key_evidence.is_empty() {
        out.push_str("Evidence:\n");
        for item in &verdict.key_evidence {
            out.push_str(&format!("  - {item}\n"));
        }
    }

    if !verdict.user_summary.is_empty() {
        out.push_str(&format!("Profile:    {}\n", verdict.user_summary));
    }

    out.push_str("Thread:\n");
    if let Some(grandparent) = &alert.context.grandparent {
        out.push_str(&quoted("  > ", grandparent));
    }
    if let Some(parent) = &alert.context.parent {
        out.push_str(&quoted("  > ", parent));
    }
    out.push_str(&quoted("  >> ", &alert.context.message));

    out.push_str(&format!(
        "Link:       {}/posts/{}\n",
        link_base.trim_end_matches('/'),
        alert.context.message.id
    ));
    out
}

fn quoted(prefix: &str, message: &ThreadMessage) -> String {
    format!(
        "{}@{}: {}\n",
        prefix,
        message.author.handle,
        clip(&message.text, EXCERPT_MAX)
    )
}

pub struct AlertNotifier {
    sink: Arc<dyn NotificationSink>,
    link_base: String,
    stats: Arc<SentinelStats>,
}

impl AlertNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>, link_base: &str, stats: Arc<SentinelStats>) -> Self {
        Self {
            sink,
            link_base: link_base.to_string(),
            stats,
        }
    }

    /// Render and hand off one alert. Broadcast unless the alert carries
    /// an explicit target.
    pub async fn notify(&self, alert: FudAlert) {
        let text = render_alert(&alert, &self.link_base);
        match self.sink.send(alert.target.as_deref(), &text).await {
            Ok(()) => {
                SentinelStats::bump(&self.stats.alerts_sent);
                info!(
                    user = alert.user.handle.as_str(),
                    risk = %alert.verdict.user_risk_level,
                    from_cache = alert.from_cache,
                    "FUD alert delivered"
                );
            }
            Err(e) => {
                SentinelStats::bump(&self.stats.alert_failures);
                warn!(
                    user = alert.user.handle.as_str(),
                    error = %e,
                    "Alert delivery failed, not retrying"
                );
            }
        }
    }
}
