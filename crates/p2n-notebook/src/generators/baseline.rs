// crates/p2n-notebook/src/generators/baseline.rs
// ============================================================================
// Module: Baseline Model Generator
// Description: Emits training and evaluation code for the baseline family.
// Purpose: Train a fixed-solver linear model and persist metrics.
// Dependencies: crate::generator, p2n-core
// ============================================================================

//! ## Overview
//! The baseline family is a logistic-regression classifier with a fixed
//! solver; epochs map onto the iteration budget. The emitted cell trains,
//! evaluates every plan metric, writes `metrics.json` to the working
//! directory, and raises the typed domain events the executor forwards.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::PlanV11;

use crate::generator::CodeGenerator;

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Iterations granted per plan epoch.
const ITERATIONS_PER_EPOCH: u32 = 50;

/// Generator for the baseline logistic-regression family.
pub struct BaselineModelGenerator;

impl CodeGenerator for BaselineModelGenerator {
    fn label(&self) -> &'static str {
        "model/baseline"
    }

    fn imports(&self, _plan: &PlanV11) -> Vec<String> {
        vec![
            "from sklearn.linear_model import LogisticRegression".to_string(),
            "from sklearn.metrics import accuracy_score, f1_score, precision_score, recall_score"
                .to_string(),
        ]
    }

    fn code(&self, plan: &PlanV11) -> String {
        let max_iter = plan.config.epochs * ITERATIONS_PER_EPOCH;
        let secondary = python_string_list(&plan.metrics.secondary);

        format!(
            "model = LogisticRegression(solver=\"lbfgs\", max_iter={max_iter}, random_state=SEED)\n\
             model.fit(X_train, y_train)\n\
             log_event(\"training_complete\", {{\"model\": \"{model_name}\", \"epochs\": {epochs}}})\n\
             \n\
             y_pred = model.predict(X_test)\n\
             \n\
             def compute_metric(name, y_true, y_hat):\n\
             \x20   key = name.lower().replace(\"-\", \"_\")\n\
             \x20   if key in (\"accuracy\", \"acc\"):\n\
             \x20       return float(accuracy_score(y_true, y_hat))\n\
             \x20   if key in (\"f1\", \"f1_score\", \"macro_f1\"):\n\
             \x20       return float(f1_score(y_true, y_hat, average=\"macro\"))\n\
             \x20   if key == \"precision\":\n\
             \x20       return float(precision_score(y_true, y_hat, average=\"macro\"))\n\
             \x20   if key == \"recall\":\n\
             \x20       return float(recall_score(y_true, y_hat, average=\"macro\"))\n\
             \x20   return float(accuracy_score(y_true, y_hat))\n\
             \n\
             metrics = {{\"{primary}\": compute_metric(\"{primary}\", y_test, y_pred)}}\n\
             for extra_metric in {secondary}:\n\
             \x20   metrics[extra_metric] = compute_metric(extra_metric, y_test, y_pred)\n\
             \n\
             with open(\"metrics.json\", \"w\", encoding=\"utf-8\") as handle:\n\
             \x20   json.dump(metrics, handle, sort_keys=True)\n\
             \n\
             log_event(\"evaluation_complete\", {{\"metrics\": metrics}})\n\
             for metric_name, metric_value in sorted(metrics.items()):\n\
             \x20   log_event(\"metric_update\", {{\n\
             \x20       \"metric\": metric_name,\n\
             \x20       \"value\": metric_value,\n\
             \x20       \"split\": \"{split}\",\n\
             \x20   }})\n",
            model_name = plan.model.name,
            epochs = plan.config.epochs,
            primary = plan.metrics.primary,
            split = plan.dataset.test_split,
        )
    }

    fn requirements(&self, _plan: &PlanV11) -> Vec<String> {
        Vec::new()
    }
}

/// Renders a Python list literal of quoted strings.
fn python_string_list(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|value| format!("\"{value}\"")).collect();
    format!("[{}]", quoted.join(", "))
}
