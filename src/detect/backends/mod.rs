pub mod hog_svm;
pub mod stub;

#[cfg(feature = "backend-opencv")]
pub mod opencv_hog;

pub use hog_svm::{HogScanParams, HogSvmBackend};
pub use stub::StubBackend;

#[cfg(feature = "backend-opencv")]
pub use opencv_hog::{default_people_detector, OpencvHogBackend};
