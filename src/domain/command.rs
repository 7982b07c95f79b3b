use chrono::{DateTime, Utc};

use crate::domain::Amount;

/// One replayed caller action. `reference` is the caller's own label for a
/// reservation; the driver maps it to the generated request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Request { amount: Amount },
    Confirm,
    Release,
    Reclaim { cutoff: Option<DateTime<Utc>> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub customer_id: String,
    pub reference: String,
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.kind {
            CommandKind::Request { amount } => write!(
                f,
                "request,customer={},ref={},amount={}",
                self.customer_id, self.reference, amount
            ),
            CommandKind::Confirm => {
                write!(f, "confirm,customer={},ref={}", self.customer_id, self.reference)
            }
            CommandKind::Release => {
                write!(f, "release,customer={},ref={}", self.customer_id, self.reference)
            }
            CommandKind::Reclaim { cutoff: Some(cutoff) } => write!(
                f,
                "reclaim,customer={},cutoff={}",
                self.customer_id,
                cutoff.to_rfc3339()
            ),
            CommandKind::Reclaim { cutoff: None } => {
                write!(f, "reclaim,customer={}", self.customer_id)
            }
        }
    }
}
