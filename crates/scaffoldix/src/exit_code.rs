use std::process::ExitCode;

use scaffoldix_core::{ErrorCategory, ScaffoldError};

/// Map error categories to fixed exit-code ranges so scripts can branch on
/// the failure area without parsing messages.
pub fn for_error(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<ScaffoldError>() {
        Some(scaffold) => ExitCode::from(area_code(scaffold.category())),
        None => ExitCode::FAILURE,
    }
}

fn area_code(category: ErrorCategory) -> u8 {
    match category {
        ErrorCategory::Pack => 10,
        ErrorCategory::Store => 11,
        ErrorCategory::Compatibility => 13,
        ErrorCategory::Manifest => 20,
        ErrorCategory::Generation => 30,
        ErrorCategory::Patch => 40,
        ErrorCategory::Hook => 50,
        ErrorCategory::State => 60,
        ErrorCategory::Registry => 70,
        ErrorCategory::Input => 80,
        ErrorCategory::Internal => 99,
    }
}
