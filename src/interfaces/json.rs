use crate::application::payees::PayeeRequest;
use crate::domain::payee::Payee;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Box<PayeeRequest>),
    Many(Vec<PayeeRequest>),
}

/// Parses a single payee request or an array of them.
pub fn read_payee_requests<R: Read>(source: R) -> Result<Vec<PayeeRequest>> {
    Ok(match serde_json::from_reader(source)? {
        OneOrMany::One(request) => vec![*request],
        OneOrMany::Many(requests) => requests,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Snapshot {
    Report { registered: Vec<Payee> },
    Many(Vec<Payee>),
    One(Box<Payee>),
}

/// Parses registered payees: a `register`/`import` report, an array of
/// payees or a single payee.
pub fn read_payee_snapshot<R: Read>(source: R) -> Result<Vec<Payee>> {
    Ok(match serde_json::from_reader(source)? {
        Snapshot::Report { registered } => registered,
        Snapshot::Many(payees) => payees,
        Snapshot::One(payee) => vec![*payee],
    })
}

/// Writes `value` as pretty JSON followed by a newline.
pub fn write_report<W: Write, T: Serialize>(mut sink: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut sink, value)?;
    writeln!(sink)?;
    Ok(())
}
