//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;
pub use crate::{Geometry, MreError, MreResult, Volume};

pub use crate::align::{AlignmentReport, WaveSliceAligner};
pub use crate::config::PipelineConfig;
pub use crate::mask::{Conv3dPredictor, ElastographyMaskGenerator, LiverMaskGenerator, Predictor};
pub use crate::pipeline::{open_store, MreToXr, RunSummary, SubjectStatus, XrSource};
pub use crate::register::{
    AxialShiftRegistration, GeometricRegistration, Registration, RegistrationProfile,
};
pub use crate::resample::{GridSpec, ImageResampler, ImageRole, Interpolation};
pub use crate::store::{Coords, Tensor, VolumeStore};

pub use crate::consts::gray::{MASK_BACKGROUND, MASK_FOREGROUND};

pub use crate::dataset::{self, home_dataset_dir_with, SetType};
