pub mod compensation;
pub mod fulfillment;
pub mod refund;

pub use compensation::{CompensationReport, CompensationService, StepOutcome};
pub use fulfillment::{FulfillmentOutcome, FulfillmentService, FulfillmentStatus};
pub use refund::{RefundOutcome, RefundService};
