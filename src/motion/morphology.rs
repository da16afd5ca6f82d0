use image::GrayImage;
use imageproc::distance_transform::Norm;

/// Morphological opening (erosion then dilation) of a binary mask.
///
/// The structuring element is the L1 ball of radius `kernel_size / 2`. At the
/// default size of 3 this is the 3x3 cross that a 3x3 elliptical kernel
/// rasterises to. A kernel size of 0 or 1 returns the mask unchanged.
pub fn open(mask: &GrayImage, kernel_size: u32) -> GrayImage {
    let radius = (kernel_size / 2).min(u8::MAX as u32) as u8;
    if radius == 0 {
        return mask.clone();
    }
    imageproc::morphology::open(mask, Norm::L1, radius)
}
