pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    batch_options, collect_rows, emit_report, errors_path_for, expand_path, reconcile_options,
};
