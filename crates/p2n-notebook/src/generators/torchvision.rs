// crates/p2n-notebook/src/generators/torchvision.rs
// ============================================================================
// Module: Torchvision Dataset Generator
// Description: Emits download and flattening code for torchvision datasets.
// Purpose: Produce numeric arrays the baseline model family can consume.
// Dependencies: crate::generator, p2n-core
// ============================================================================

//! ## Overview
//! Torchvision datasets download into a local cache directory and flatten to
//! scaled numeric arrays for the baseline family. The cache location and the
//! offline toggle are injected at runtime through environment variables so
//! the emitted code stays byte-stable across deployments.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::PlanV11;

use crate::generator::CodeGenerator;

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Generator for torchvision image datasets.
pub struct TorchvisionDatasetGenerator;

impl CodeGenerator for TorchvisionDatasetGenerator {
    fn label(&self) -> &'static str {
        "dataset/torchvision"
    }

    fn imports(&self, _plan: &PlanV11) -> Vec<String> {
        vec!["import torchvision".to_string()]
    }

    fn code(&self, plan: &PlanV11) -> String {
        let class_name = plan
            .dataset
            .loader_hints
            .get("torchvision_class")
            .cloned()
            .unwrap_or_else(|| "MNIST".to_string());

        format!(
            "cache_dir = os.environ.get(\"DATASET_CACHE_DIR\", \"./dataset-cache\")\n\
             offline = os.environ.get(\"OFFLINE_MODE\", \"\").lower() in (\"1\", \"true\")\n\
             \n\
             train_set = torchvision.datasets.{class_name}(cache_dir, train=True, download=not offline)\n\
             test_set = torchvision.datasets.{class_name}(cache_dir, train=False, download=not offline)\n\
             \n\
             X_train = np.asarray(train_set.data, dtype=np.float64).reshape(len(train_set), -1) / 255.0\n\
             X_test = np.asarray(test_set.data, dtype=np.float64).reshape(len(test_set), -1) / 255.0\n\
             y_train = np.asarray(train_set.targets)\n\
             y_test = np.asarray(test_set.targets)\n\
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
        vec!["torch==2.2.2".to_string(), "torchvision==0.17.2".to_string()]
    }
}
