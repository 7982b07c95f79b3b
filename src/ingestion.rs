use std::io::Read;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::Deserialize;

use crate::domain::traits::CommandStream;
use crate::domain::{Amount, Command, CommandKind, Error};

pub struct CsvReader<R: Read> {
    reader: Option<csv::Reader<R>>,
}

impl<R: Read> CsvReader<R> {
    pub fn new(reader: R) -> Result<Self, Error> {
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        Ok(Self { reader: Some(rdr) })
    }
}

/// Internal shape used only for CSV deserialization.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "type")]
    kind: String,
    customer: String,
    #[serde(default, rename = "ref")]
    reference: Option<String>,
    #[serde(default)]
    amount: Option<Amount>,
    #[serde(default)]
    cutoff: Option<String>,
}

impl TryFrom<CsvRow> for Command {
    type Error = Error;

    fn try_from(row: CsvRow) -> Result<Self, Self::Error> {
        let reference = row.reference.filter(|r| !r.is_empty());
        let cutoff = row.cutoff.filter(|c| !c.is_empty());

        let kind = match (
            row.kind.trim().to_ascii_lowercase().as_str(),
            row.amount,
            reference.is_some(),
        ) {
            ("request", Some(amount), true) => CommandKind::Request { amount },
            ("confirm", None, true) => CommandKind::Confirm,
            ("release", None, true) => CommandKind::Release,
            ("reclaim", None, _) => CommandKind::Reclaim {
                cutoff: cutoff.as_deref().map(parse_cutoff).transpose()?,
            },
            (other, _, _) => {
                return Err(Error::Ingestion(format!(
                    "Invalid command type or arguments: {}",
                    other
                )));
            }
        };

        Ok(Command {
            kind,
            customer_id: row.customer,
            reference: reference.unwrap_or_default(),
        })
    }
}

fn parse_cutoff(s: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Ingestion(format!("Invalid cutoff {}: {}", s, e)))
}

impl<R: Read + Send + 'static> CommandStream for CsvReader<R> {
    type CmdStream = Pin<Box<dyn Stream<Item = Result<Command, Error>> + Send>>;

    fn stream(&mut self) -> Self::CmdStream {
        // Take ownership of the reader so the iterator we build owns all data and is 'static.
        let reader = match self.reader.take() {
            Some(r) => r,
            None => {
                // Already consumed; return an empty stream.
                return Box::pin(stream::iter(Vec::<Result<Command, Error>>::new()));
            }
        };

        let iter = reader
            .into_deserialize::<CsvRow>()
            .map(|row_res| match row_res {
                Ok(row) => Command::try_from(row),
                Err(e) => Err(Error::Ingestion(format!(
                    "CSV deserialization error: {}",
                    e
                ))),
            });

        Box::pin(stream::iter(iter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use rust_decimal::dec;

    #[tokio::test]
    async fn parses_every_command_type() {
        let input = "type, customer, ref, amount, cutoff\n\
            request, c1, a, 12.5\n\
            confirm, c1, a,\n\
            release, c1, b\n\
            reclaim, c1, , , 2030-01-01T00:00:00Z\n\
            reclaim, c2\n\
            request, c1, , 3\n\
            refund, c1, a, 1\n";
        let mut reader = CsvReader::new(input.as_bytes()).unwrap();
        let results: Vec<_> = reader.stream().collect().await;
        assert_eq!(results.len(), 7);

        let cmd = results[0].as_ref().unwrap();
        assert_eq!(cmd.kind, CommandKind::Request { amount: Amount(dec!(12.5)) });
        assert_eq!(cmd.reference, "a");
        assert_eq!(results[1].as_ref().unwrap().kind, CommandKind::Confirm);
        assert_eq!(results[2].as_ref().unwrap().kind, CommandKind::Release);
        assert_eq!(
            results[3].as_ref().unwrap().kind,
            CommandKind::Reclaim {
                cutoff: Some(parse_cutoff("2030-01-01T00:00:00Z").unwrap())
            }
        );
        assert_eq!(
            results[4].as_ref().unwrap().kind,
            CommandKind::Reclaim { cutoff: None }
        );
        assert!(matches!(results[5], Err(Error::Ingestion(_))));
        assert!(matches!(results[6], Err(Error::Ingestion(_))));

        assert!(reader.stream().next().await.is_none());
    }
}
