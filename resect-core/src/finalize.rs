//! 输出: 把工作空间中的腔体掩膜映射回调用方的参考空间.

use crate::resample::resample_nearest;
use crate::{GridSpace, Mask, ResectError, ResectResult};

/// 将 `mask` 最近邻重采样到 `reference`.
///
/// # 返回值
///
/// 结果的形状与仿射矩阵与 `reference` 完全一致, 取值仍为 0/1.
pub fn finalize(mask: &Mask, reference: &GridSpace) -> ResectResult<Mask> {
    if reference.is_empty() {
        return Err(ResectError::InvalidInput(
            "reference grid has no voxels".to_string(),
        ));
    }
    if mask.space().same_as(reference) {
        return Mask::new(reference.clone(), mask.binarized().into_data());
    }
    let out = resample_nearest(&mask.binarized(), reference)?;
    log::info!(
        "Cavity mask resampled from {:?} to {:?}: {} -> {} voxels",
        mask.shape(),
        reference.shape(),
        mask.count(),
        out.count()
    );
    Ok(out)
}
