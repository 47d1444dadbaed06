//! Test assertions for assembled models.

use crate::core::Package;
use crate::pipeline::Model;
use std::sync::Arc;

/// Asserts that a stage is built.
pub fn assert_stage_built(model: &Model, stage: &str) {
    assert!(
        model.is_built(stage),
        "Expected stage '{}' to be built, got status: {:?}",
        stage,
        model.stage_status(stage)
    );
}

/// Asserts that a stage is not built.
pub fn assert_stage_not_built(model: &Model, stage: &str) {
    assert!(
        !model.is_built(stage),
        "Expected stage '{}' not to be built",
        stage
    );
}

/// Asserts that two outputs are the same allocation.
pub fn assert_same_output(a: &Arc<Package>, b: &Arc<Package>) {
    assert!(
        Arc::ptr_eq(a, b),
        "Expected the same {} package instance, got a rebuilt one",
        a.type_name()
    );
}

/// Asserts element-wise closeness within `tolerance`.
pub fn assert_all_close<'a>(actual: impl IntoIterator<Item = &'a f64>, expected: f64, tolerance: f64) {
    for (i, value) in actual.into_iter().enumerate() {
        assert!(
            (value - expected).abs() <= tolerance,
            "Element {} is {}, expected {} within {}",
            i,
            value,
            expected,
            tolerance
        );
    }
}
