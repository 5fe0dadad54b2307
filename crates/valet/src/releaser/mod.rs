//! The reconciliation engine.
//!
//! Documents flow through [`gate`], [`constraint`], [`resolver`] and
//! [`patcher`]; files are found by [`rules`] and proposed by [`publisher`];
//! [`reconciler`] drives one repository end to end and records every outcome
//! in a [`report`].

pub mod constraint;
pub mod error;
pub mod gate;
pub mod patcher;
pub mod publisher;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod rules;

pub use constraint::{Constraint, ConstraintError};
pub use error::{DocumentError, PublishError, ReleaserError, RuleError};
pub use gate::{Automation, AUTOMATED_ANNOTATION, CHART_FILTER_ANNOTATION};
pub use patcher::{ChartReference, PatchResult};
pub use publisher::{branch_name, BranchPolicy, PublishResult, Publisher};
pub use reconciler::{scan_and_update, Releaser, ReleaserOptions};
pub use report::{
    ChartUpdate, DocumentOutcome, DocumentReport, FileOutcome, FileReport, InstallationFailure,
    RepositoryOutcome, RepositoryReport, RuleReport, ScanReport, ScanSummary,
};
pub use resolver::Resolution;
pub use rules::{Rule, RuleSet, Strategy, DEFAULT_RELEASE_CONFIG_PATH};
