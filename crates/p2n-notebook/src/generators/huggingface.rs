// crates/p2n-notebook/src/generators/huggingface.rs
// ============================================================================
// Module: Hugging Face Dataset Generator
// Description: Emits loading and featurization code for hub datasets.
// Purpose: Turn registry loader hints into deterministic dataset code.
// Dependencies: crate::generator, p2n-core
// ============================================================================

//! ## Overview
//! Hub datasets load by the registry's dataset/config hints. Textual tasks
//! vectorize with a bag-of-words featurizer; the vectorizer is deterministic
//! and takes no seed. Labels come from the hinted label column.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::PlanV11;

use crate::generator::CodeGenerator;

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Generator for Hugging Face hub datasets.
pub struct HuggingfaceDatasetGenerator;

impl CodeGenerator for HuggingfaceDatasetGenerator {
    fn label(&self) -> &'static str {
        "dataset/huggingface"
    }

    fn imports(&self, _plan: &PlanV11) -> Vec<String> {
        vec![
            "from datasets import load_dataset".to_string(),
            "from sklearn.feature_extraction.text import CountVectorizer".to_string(),
        ]
    }

    fn code(&self, plan: &PlanV11) -> String {
        let hints = &plan.dataset.loader_hints;
        let hf_dataset = hints.get("hf_dataset").cloned().unwrap_or_else(|| plan.dataset.name.clone());
        let load_call = hints.get("hf_config").map_or_else(
            || format!("load_dataset(\"{hf_dataset}\")"),
            |config| format!("load_dataset(\"{hf_dataset}\", \"{config}\")"),
        );
        let text_column = hints.get("text_column").map_or("text", String::as_str);
        let label_column = hints.get("label_column").map_or("label", String::as_str);

        format!(
            "dataset = {load_call}\n\
             train_rows = dataset[\"{train}\"]\n\
             test_rows = dataset[\"{test}\"]\n\
             \n\
             vectorizer = CountVectorizer(max_features=20000)\n\
             X_train = vectorizer.fit_transform(row[\"{text_column}\"] for row in train_rows)\n\
             X_test = vectorizer.transform(row[\"{text_column}\"] for row in test_rows)\n\
             y_train = [row[\"{label_column}\"] for row in train_rows]\n\
             y_test = [row[\"{label_column}\"] for row in test_rows]\n\
             \n\
             log_event(\"dataset_loaded\", {{\n\
             \x20   \"dataset\": \"{name}\",\n\
             \x20   \"train_rows\": X_train.shape[0],\n\
             \x20   \"test_rows\": X_test.shape[0],\n\
             \x20   \"features\": X_train.shape[1],\n\
             }})\n",
            train = plan.dataset.train_split,
            test = plan.dataset.test_split,
            name = plan.dataset.name,
        )
    }

    fn requirements(&self, _plan: &PlanV11) -> Vec<String> {
        vec!["datasets==2.19.2".to_string()]
    }
}
