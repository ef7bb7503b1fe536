//! Unit tests for error.rs

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("vkQueueSubmit returned ERROR_DEVICE_LOST".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("ERROR_DEVICE_LOST"));
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");
}

#[test]
fn test_contract_violation_display() {
    let err = Error::ContractViolation("add_binding after bake".to_string());
    let display = format!("{}", err);
    assert!(display.starts_with("Contract violation"));
    assert!(display.contains("add_binding after bake"));
}

#[test]
fn test_io_error_names_path() {
    let err = Error::Io("shaders/missing.vert.spv: No such file".to_string());
    assert!(format!("{}", err).contains("shaders/missing.vert.spv"));
}

#[test]
fn test_initialization_failed_display() {
    let err = Error::InitializationFailed("No suitable GPU".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Initialization failed"));
    assert!(display.contains("No suitable GPU"));
}

// ============================================================================
// TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_clone_keeps_message() {
    let err = Error::InvalidResource("buffer released".to_string());
    let copy = err.clone();
    assert_eq!(format!("{}", err), format!("{}", copy));
}

#[test]
fn test_result_question_mark_propagation() {
    fn inner() -> Result<u32> {
        Err(Error::InvalidResource("inner".to_string()))
    }
    fn outer() -> Result<u32> {
        let value = inner()?;
        Ok(value + 1)
    }
    assert!(matches!(outer(), Err(Error::InvalidResource(_))));
}
