//! callaudit - change-tracking and report-aggregation core for call-center QA
//!
//! The crate has two engines behind the QA screens: the change-tracking
//! ledger with its submission reconciler, and the report derivation
//! pipeline (deviations, rolling summaries, MCA selection). Presentation,
//! PDF rendering, and mail transport are external collaborators reached
//! through the `store` and `notify` contracts.

pub mod audit;
pub mod error;
pub mod exports;
pub mod ledger;
pub mod notify;
pub mod record;
pub mod reports;
pub mod session;
pub mod store;
pub mod submit;
pub mod users;
pub mod validation;

pub use error::{AppError, ErrorCategory};
pub use ledger::{ChangeLedger, EditMode};
pub use record::{FieldValue, Record, RecordType};
pub use session::SessionState;
pub use store::{MemoryStore, RecordQuery, RecordStore};
pub use submit::{SubmissionReconciler, SubmissionReport};
