//! Dispatch, quota and convergence machinery.

pub mod clock;
pub mod convergence;
pub mod cooldown;
pub mod dispatcher;
pub mod doctor;
pub mod http;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod quality;
pub mod quota;
pub mod registry;
pub mod retry;

pub use clock::{Clock, SystemClock};
pub use convergence::{ConvergenceSummary, LoopConfig, Phase, QualityConvergenceLoop};
pub use cooldown::{CooldownTracker, DEFAULT_COOLDOWN};
pub use dispatcher::{DEFAULT_MAX_QUOTA_WAIT, DispatchOutcome, Dispatcher};
pub use doctor::{CheckStatus, DiagnosticCheck, DoctorReport, ProviderHealth};
pub use models::{
    Acceptance, Attempt, ContentUnit, OutcomeKind, QualityReport, Request, ResponseFormat,
    RiskLevel, TaskType, UnitStatus,
};
pub use normalize::ContentNormalizer;
pub use progress::{ProgressCallback, ProgressEvent};
pub use quality::{parse_report, report_schema};
pub use quota::{DEFAULT_WINDOW, QuotaStatus, QuotaTracker, Reservation};
pub use registry::{AuthMechanism, CostClass, ModelSpec, Provider, ProviderRegistry};
pub use retry::RetryPolicy;
