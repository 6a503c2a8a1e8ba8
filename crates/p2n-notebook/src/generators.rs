// crates/p2n-notebook/src/generators.rs
// ============================================================================
// Module: Generator Families and Factory
// Description: Dataset and model generator families with selection logic.
// Purpose: Choose emitters from plan content and registry source kinds.
// Dependencies: crate::generator, p2n-core, p2n-registry
// ============================================================================

//! ## Overview
//! Dataset generators are chosen by the plan's canonical dataset name: a
//! registry hit dispatches on the entry's source kind, an upload-backed plan
//! selects the tabular family, and everything else falls back to synthetic
//! data. The model family is currently a constant; the factory is the future
//! dispatch point for `plan.model.architecture`.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod baseline;
pub mod huggingface;
pub mod sklearn;
pub mod synthetic;
pub mod tabular;
pub mod torchvision;

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::PlanV11;
use p2n_core::SourceKind;
use p2n_registry::DatasetRegistry;

use crate::generator::CodeGenerator;
use crate::generators::baseline::BaselineModelGenerator;
use crate::generators::huggingface::HuggingfaceDatasetGenerator;
use crate::generators::sklearn::SklearnDatasetGenerator;
use crate::generators::synthetic::SyntheticDatasetGenerator;
use crate::generators::tabular::TabularDatasetGenerator;
use crate::generators::torchvision::TorchvisionDatasetGenerator;

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Selects the dataset generator for a plan.
///
/// Selection order: registry source kind, upload format tag, synthetic.
#[must_use]
pub fn select_dataset_generator(
    plan: &PlanV11,
    registry: &DatasetRegistry,
) -> Box<dyn CodeGenerator> {
    if let Some(entry) = registry.lookup(&plan.dataset.name) {
        return match entry.source {
            SourceKind::Sklearn => Box::new(SklearnDatasetGenerator),
            SourceKind::Torchvision => Box::new(TorchvisionDatasetGenerator),
            SourceKind::Huggingface => Box::new(HuggingfaceDatasetGenerator),
            SourceKind::Synthetic | SourceKind::Upload => Box::new(SyntheticDatasetGenerator),
        };
    }
    let upload_backed = plan.dataset.source == SourceKind::Upload
        || plan.dataset.loader_hints.contains_key("upload_format");
    if upload_backed {
        return Box::new(TabularDatasetGenerator);
    }
    Box::new(SyntheticDatasetGenerator)
}

/// Selects the model generator for a plan.
///
/// The baseline family is the only supported architecture; dispatch on
/// `plan.model.architecture` lands here when more families arrive.
#[must_use]
pub fn select_model_generator(_plan: &PlanV11) -> Box<dyn CodeGenerator> {
    Box::new(BaselineModelGenerator)
}
