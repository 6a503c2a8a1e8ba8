// crates/p2n-notebook/src/generators/tabular.rs
// ============================================================================
// Module: Tabular Upload Generator
// Description: Emits loading code for user-uploaded CSV and Excel files.
// Purpose: Read the upload at a runtime-injected path with encoding applied.
// Dependencies: crate::generator, p2n-core
// ============================================================================

//! ## Overview
//! Uploaded datasets are mounted into the run's working directory by the
//! executor; the notebook reads the path from an environment variable. The
//! target column comes from the explicit hint when the extractor captured
//! one, else the last column is assumed. Categorical features one-hot encode
//! and labels factorize for the baseline family.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::PlanV11;

use crate::generator::CodeGenerator;

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Generator for user-uploaded tabular files.
pub struct TabularDatasetGenerator;

impl CodeGenerator for TabularDatasetGenerator {
    fn label(&self) -> &'static str {
        "dataset/tabular"
    }

    fn imports(&self, _plan: &PlanV11) -> Vec<String> {
        vec![
            "import pandas as pd".to_string(),
            "from sklearn.model_selection import train_test_split".to_string(),
        ]
    }

    fn code(&self, plan: &PlanV11) -> String {
        let format = plan
            .dataset
            .loader_hints
            .get("upload_format")
            .map_or("csv", String::as_str);
        let reader = match format {
            "xlsx" | "xls" => "pd.read_excel(dataset_path)",
            _ => "pd.read_csv(dataset_path)",
        };
        let target_selector = plan.dataset.loader_hints.get("target_column").map_or_else(
            || "target_column = frame.columns[-1]\n".to_string(),
            |column| format!("target_column = \"{column}\"\n"),
        );

        format!(
            "dataset_path = os.environ.get(\"P2N_DATASET_PATH\", \"dataset.{format}\")\n\
             frame = {reader}\n\
             {target_selector}\
             \n\
             labels, _label_names = pd.factorize(frame[target_column])\n\
             features = pd.get_dummies(frame.drop(columns=[target_column]))\n\
             features = features.fillna(0.0).astype(float)\n\
             \n\
             X_train, X_test, y_train, y_test = train_test_split(\n\
             \x20   features.to_numpy(), labels, test_size=0.25, random_state=SEED\n\
             )\n\
             \n\
             log_event(\"dataset_loaded\", {{\n\
             \x20   \"dataset\": \"{name}\",\n\
             \x20   \"train_rows\": int(X_train.shape[0]),\n\
             \x20   \"test_rows\": int(X_test.shape[0]),\n\
             \x20   \"features\": int(X_train.shape[1]),\n\
             \x20   \"target_column\": str(target_column),\n\
             }})\n",
            name = plan.dataset.name,
        )
    }

    fn requirements(&self, plan: &PlanV11) -> Vec<String> {
        let mut pins = Vec::new();
        match plan.dataset.loader_hints.get("upload_format").map(String::as_str) {
            Some("xlsx") => pins.push("openpyxl==3.1.2".to_string()),
            Some("xls") => pins.push("xlrd==2.0.1".to_string()),
            _ => {}
        }
        pins
    }
}
