// crates/p2n-notebook/src/generators/synthetic.rs
// ============================================================================
// Module: Synthetic Dataset Generator
// Description: Emits generated classification data as the fallback family.
// Purpose: Keep materialization possible when no real dataset is usable.
// Dependencies: crate::generator, p2n-core
// ============================================================================

//! ## Overview
//! The synthetic family is the last-resort fallback: seeded generated
//! classification data with dimensions from the loader hints. It exists so a
//! plan with a registry-resolved synthetic dataset still exercises the full
//! notebook skeleton.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::PlanV11;

use crate::generator::CodeGenerator;

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Generator for seeded synthetic classification data.
pub struct SyntheticDatasetGenerator;

impl CodeGenerator for SyntheticDatasetGenerator {
    fn label(&self) -> &'static str {
        "dataset/synthetic"
    }

    fn imports(&self, _plan: &PlanV11) -> Vec<String> {
        vec![
            "from sklearn.datasets import make_classification".to_string(),
            "from sklearn.model_selection import train_test_split".to_string(),
        ]
    }

    fn code(&self, plan: &PlanV11) -> String {
        let hints = &plan.dataset.loader_hints;
        let n_samples = hints.get("n_samples").map_or("2000", String::as_str);
        let n_features = hints.get("n_features").map_or("20", String::as_str);

        format!(
            "X, y = make_classification(\n\
             \x20   n_samples={n_samples}, n_features={n_features}, random_state=SEED\n\
             )\n\
             X_train, X_test, y_train, y_test = train_test_split(\n\
             \x20   X, y, test_size=0.25, random_state=SEED\n\
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
