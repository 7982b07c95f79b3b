pub mod account;
pub mod command;
pub mod error;
pub mod money;
pub mod reservation;
pub mod traits;

pub use account::{Account, AccountUpdate};
pub use command::{Command, CommandKind};
pub use error::{Error, PartialFailure, StoreError};
pub use money::Amount;
pub use reservation::{Reservation, ReservationPage};
pub use traits::{Clock, CommandStream, DeadLetterQueue, LedgerStore, PartialFailureHook};
