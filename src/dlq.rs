use crate::domain::{Command, DeadLetterQueue, Error};

#[derive(Default, Debug)]
pub struct StdErrDLQ {}

impl DeadLetterQueue for StdErrDLQ {
    fn report(&self, command: Option<&Command>, error: &Error) {
        match command {
            Some(command) => eprintln!("DLQ Report - Command: {} - Error: {}", command, error),
            None => eprintln!("DLQ Report - Error: {}", error),
        }
    }
}
