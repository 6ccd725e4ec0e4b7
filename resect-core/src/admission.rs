//! 边界体素吸纳.
//!
//! 切除腔体常常紧贴脑表面, 而腔体与脑外 CSF 之间那一两层体素在区域生长时
//! 很难被分到腔体一侧. 这里把 "比最近的脑外体素更靠近腔体, 且该脑外体素
//! 离腔体足够近" 的脑组织体素补回来.

use ndarray::Array3;

use crate::morph::{close, distance_transform, fill_indexed, largest_component, Connectivity};
use crate::{Mask, ResectResult};

/// 边界吸纳参数.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AdmissionParams {
    /// 最近脑外体素到腔体的距离上限 (体素), 不含.
    pub cutoff: f32,
}

impl Default for AdmissionParams {
    fn default() -> Self {
        Self { cutoff: 3.0 }
    }
}

/// 吸纳结果.
#[derive(Debug, Clone)]
pub struct Admission {
    /// 新吸纳的边界层.
    pub boundary: Mask,

    /// `base ∪ boundary` 取最大连通域后做半径 1 的闭运算.
    pub mask: Mask,
}

/// 计算边界层并得到清理后的腔体掩膜.
///
/// 对每个脑组织体素 `v`, 设 `b` 是离它最近的脑外体素, 则当
/// `dist(v) < dist(b) < cutoff` 时吸纳 `v`, 其中 `dist` 为到 `base` 的欧氏距离.
///
/// # 注意
///
/// `outside` 为空时没有边界层, 打印警告后只做清理.
pub fn admit(
    base: &Mask,
    brain: &Mask,
    outside: &Mask,
    params: &AdmissionParams,
) -> ResectResult<Admission> {
    base.ensure_same_space(brain)?;
    base.ensure_same_space(outside)?;

    let to_border = distance_transform(outside)?;
    let boundary = if to_border.has_sites() {
        let to_base = distance_transform(base)?;
        let dist = to_base.distance().data();
        let tissue = brain.data();
        let cutoff = params.cutoff;

        let mut out = Array3::zeros(base.shape());
        fill_indexed(&mut out, |pos| {
            if tissue[pos] == 0 {
                return 0;
            }
            let Some(b) = to_border.nearest(pos) else {
                return 0;
            };
            let reference = dist[b];
            (dist[pos] < reference && reference < cutoff) as u8
        });
        Mask::sharing_space(base, out)
    } else {
        log::warn!("No outside-brain voxels, boundary admission skipped");
        Mask::zeros(base.space().clone())
    };

    let merged = base.binarized().union(&boundary)?;
    let mask = close(
        &largest_component(&merged, Connectivity::Full26),
        Connectivity::Face6,
        1,
    );
    log::info!(
        "Boundary admission: +{} voxels, cleaned cavity {} voxels",
        boundary.subtract(base)?.count(),
        mask.count()
    );
    Ok(Admission { boundary, mask })
}
