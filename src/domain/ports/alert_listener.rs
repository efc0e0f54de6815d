use crate::domain::models::AlertEvent;

/// Consumer of the alert stream (CLI reporting, feedback loops, report writers).
///
/// Listeners run on their own task; an error or panic is logged by the bus and
/// never reaches the detector that raised the alert.
pub trait AlertListener: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str {
        "listener"
    }

    fn on_alert(&self, event: &AlertEvent) -> anyhow::Result<()>;
}
