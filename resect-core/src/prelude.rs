//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;
pub use crate::{Affine, GridSpace, LabelGrid, Mask, ScalarGrid, VolumeGrid, Voxel};
pub use crate::{ResectError, ResectResult};

pub use crate::atlas::{Hemisphere, Lobe, LobeSelection, RegionAtlas, Selection};
pub use crate::consts::{tag, LabelSet, OUTSIDE_BRAIN};

pub use crate::morph::{distance_transform, largest_component, Connectivity};

pub use crate::admission::AdmissionParams;
pub use crate::classify::GaussianMixtureClassifier;
pub use crate::config::ResectConfig;
pub use crate::external::{
    prepare, BiasFieldCorrector, BrainExtractor, Collaborators, Interpolation, Parcellator,
    PrepareOptions, Registration, Transform, TissueClassifier,
};
pub use crate::finalize::finalize;
pub use crate::growth::{GrowthObserver, GrowthParams};
pub use crate::pipeline::{AlignedScans, PipelineState, ResectionPipeline};
