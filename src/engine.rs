use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use futures::StreamExt;
use tracing::{debug, info};

use crate::domain::{
    Command, CommandKind, Error,
    traits::{CommandStream, DeadLetterQueue, LedgerStore},
};
use crate::manager::QuotaManager;

/// Replays caller commands against a [`QuotaManager`], standing in for
/// the HTTP and event-bus front ends. Callers name reservations with
/// their own references; the engine maps them to generated request ids.
#[derive(Debug)]
pub struct Engine<I, S, D>
where
    I: CommandStream,
    S: LedgerStore,
    D: DeadLetterQueue,
{
    ingestion: I,
    manager: QuotaManager<S>,
    dlq: D,
    references: HashMap<(String, String), String>,
    customers: BTreeSet<String>,
}

impl<I, S, D> Engine<I, S, D>
where
    I: CommandStream,
    S: LedgerStore,
    D: DeadLetterQueue,
{
    pub fn new(ingestion: I, manager: QuotaManager<S>, dlq: D) -> Self {
        Self {
            ingestion,
            manager,
            dlq,
            references: HashMap::new(),
            customers: BTreeSet::new(),
        }
    }

    pub fn manager(&self) -> &QuotaManager<S> {
        &self.manager
    }

    pub async fn process(&mut self) -> Result<(), Error> {
        let mut res = self.ingestion.stream();

        while let Some(cmd) = res.next().await {
            match cmd {
                Ok(cmd) => match self.apply_command(&cmd).await {
                    Ok(()) => {}
                    Err(e) => self.dlq.report(Some(&cmd), &e),
                },
                Err(e) => self.dlq.report(None, &e),
            }
        }

        Ok(())
    }

    async fn apply_command(&mut self, cmd: &Command) -> Result<(), Error> {
        let customer_id = cmd.customer_id.as_str();
        match &cmd.kind {
            CommandKind::Request { amount } => {
                let key = (cmd.customer_id.clone(), cmd.reference.clone());
                if self.references.contains_key(&key) {
                    return Err(Error::Ingestion(format!(
                        "Reference {} already used for customer {}",
                        cmd.reference, customer_id
                    )));
                }
                self.customers.insert(cmd.customer_id.clone());
                let request_id = self
                    .manager
                    .request(customer_id, amount.as_decimal())
                    .await?;
                self.references.insert(key, request_id);
            }
            CommandKind::Confirm => {
                let request_id = self.resolve_reference(cmd);
                self.manager.confirm(customer_id, &request_id).await?;
            }
            CommandKind::Release => {
                let request_id = self.resolve_reference(cmd);
                self.manager.release(customer_id, &request_id).await?;
            }
            CommandKind::Reclaim { cutoff } => {
                // keep sweeping until the partition has been scanned to the end
                let mut report = self.manager.reclaim(customer_id, *cutoff).await?;
                let mut reclaimed = report.reclaimed.len();
                while let Some(after) = report.resume_after.take() {
                    report = self
                        .manager
                        .reclaim_from(customer_id, *cutoff, Some(&after))
                        .await?;
                    reclaimed += report.reclaimed.len();
                }
                info!(customer_id, reclaimed, "reclaim sweep finished");
            }
        }
        Ok(())
    }

    /// Unknown references go through as-is and fail as unknown request ids.
    fn resolve_reference(&self, cmd: &Command) -> String {
        self.references
            .get(&(cmd.customer_id.clone(), cmd.reference.clone()))
            .cloned()
            .unwrap_or_else(|| {
                debug!(
                    customer_id = %cmd.customer_id,
                    reference = %cmd.reference,
                    "unknown reference"
                );
                cmd.reference.clone()
            })
    }

    /// Writes the current quota of every customer that made a request.
    pub async fn flush<W: Write>(&self, out: &mut W) -> Result<(), Error> {
        writeln!(out, "customer,avail_amount,max_amount")?;
        for customer_id in &self.customers {
            match self.manager.load(customer_id).await {
                Ok(account) => writeln!(
                    out,
                    "{},{:.4},{:.4}",
                    customer_id, account.avail_amount, account.max_amount
                )?,
                Err(Error::AccountNotFound(_)) => {}
                Err(e) => self.dlq.report(None, &e),
            }
        }
        out.flush()?;
        Ok(())
    }
}
