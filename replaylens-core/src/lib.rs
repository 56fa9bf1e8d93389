pub mod archive;
pub mod attribution;
pub mod batch;
pub mod capture;
pub mod compare;
pub mod console;
pub mod error;
pub mod listeners;
pub mod lookup;
pub mod reconcile;
pub mod redundant;
pub mod report;
pub mod resolver;
pub mod site;
pub mod trace;

pub use error::{AnalysisError, ErrorClass};
pub use listeners::{ClassifiedListener, EventListener, ListenerClassifier};
pub use reconcile::{ReconcileOptions, ReconciliationRecord, Reconciler, RequestSource};
pub use redundant::RedundantLogDetector;
pub use resolver::{ContentHashIndex, ScriptResourceResolver};
pub use trace::{CausalChain, CausalTracer};
