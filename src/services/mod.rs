pub mod settlement;

pub use settlement::{EventOutcome, SettlementService};
