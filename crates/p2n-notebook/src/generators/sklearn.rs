// crates/p2n-notebook/src/generators/sklearn.rs
// ============================================================================
// Module: Sklearn Dataset Generator
// Description: Emits loading code for bundled scikit-learn datasets.
// Purpose: Provide offline-safe datasets with seeded splits.
// Dependencies: crate::generator, p2n-core
// ============================================================================

//! ## Overview
//! Bundled datasets need no network access, so this generator works under
//! offline mode unconditionally. The train/test split is seeded with the
//! notebook seed for determinism.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::PlanV11;

use crate::generator::CodeGenerator;

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Generator for bundled scikit-learn datasets.
pub struct SklearnDatasetGenerator;

impl CodeGenerator for SklearnDatasetGenerator {
    fn label(&self) -> &'static str {
        "dataset/sklearn"
    }

    fn imports(&self, plan: &PlanV11) -> Vec<String> {
        let loader = loader_name(plan);
        vec![
            format!("from sklearn.datasets import {loader}"),
            "from sklearn.model_selection import train_test_split".to_string(),
        ]
    }

    fn code(&self, plan: &PlanV11) -> String {
        let loader = loader_name(plan);
        format!(
            "bundle = {loader}()\n\
             X_train, X_test, y_train, y_test = train_test_split(\n\
             \x20   bundle.data, bundle.target, test_size=0.25, random_state=SEED\n\
             )\n\
             \n\
             log_event(\"dataset_loaded\", {{\n\
             \x20   \"dataset\": \"{name}\",\n\
             \x20   \"train_rows\": int(X_train.shape[0]),\n\
             \x20   \"test_rows\": int(X_test.shape[0]),\n\
             \x20   \"features\": int(X_train.shape[1]),\n\
             }})\n",
            name = plan.dataset.name,
        )
    }

    fn requirements(&self, _plan: &PlanV11) -> Vec<String> {
        Vec::new()
    }
}

/// Returns the sklearn loader function for the plan's dataset.
fn loader_name(plan: &PlanV11) -> String {
    plan.dataset
        .loader_hints
        .get("sklearn_loader")
        .cloned()
        .unwrap_or_else(|| "load_iris".to_string())
}
