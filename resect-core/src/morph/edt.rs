//! 精确欧氏距离变换, 同时给出每个体素的最近点.
//!
//! 参考论文: "Distance Transforms of Sampled Functions" (Felzenszwalb & Huttenlocher).
//! 沿 x, y, z 三个轴依次求一维平方距离的下包络, 并在每一轮把最近点坐标一起传递下去.
//! 距离以体素为单位, 不考虑各向异性.

use ndarray::{Array3, ArrayViewMut1, Axis, Zip};

use super::{idx3d_to_u16, idx3du16_to_usize};
use crate::{Idx3d, Idx3dU16, Mask, ResectError, ResectResult, ScalarGrid};

/// 距离场.
#[derive(Debug, Clone)]
pub struct DistanceField {
    distance: ScalarGrid,
    nearest: Option<Array3<Idx3dU16>>,
}

impl DistanceField {
    /// 每个体素到最近点的欧氏距离. 不存在任何点时全部为 `f32::INFINITY`.
    #[inline]
    pub fn distance(&self) -> &ScalarGrid {
        &self.distance
    }

    /// 取出距离场.
    #[inline]
    pub fn into_distance(self) -> ScalarGrid {
        self.distance
    }

    /// 是否存在至少一个点?
    #[inline]
    pub fn has_sites(&self) -> bool {
        self.nearest.is_some()
    }

    /// 获取 `pos` 的最近点坐标. 不存在任何点时返回 `None`.
    ///
    /// 如果 `pos` 越界, 则程序 panic.
    #[inline]
    pub fn nearest(&self, pos: Idx3d) -> Option<Idx3d> {
        self.nearest
            .as_ref()
            .map(|n| idx3du16_to_usize(&n[pos]))
    }
}

/// 计算到 `sites` 前景的距离变换.
///
/// # 注意
///
/// 每个维度的长度不能超过 `u16::MAX`, 否则返回 `Err`.
///
/// # 返回值
///
/// 前景体素距离为 0, 最近点为自身. 同距离的最近点按扫描顺序取坐标较小者,
/// 因此对同样的输入, 结果总是相同.
pub fn distance_transform(sites: &Mask) -> ResectResult<DistanceField> {
    let (sx, sy, sz) = sites.shape();
    if [sx, sy, sz].iter().any(|&n| n > u16::MAX as usize) {
        return Err(ResectError::InvalidInput(format!(
            "grid {:?} is too large for the distance transform",
            sites.shape()
        )));
    }

    if sites.is_blank() {
        return Ok(DistanceField {
            distance: sites.map(|_| f32::INFINITY),
            nearest: None,
        });
    }

    let mut dist = sites
        .data()
        .mapv(|v| if v != 0 { 0.0f64 } else { f64::INFINITY });
    let mut feat = Array3::from_shape_fn(sites.shape(), |pos| idx3d_to_u16(&pos));

    for ax in 0..3 {
        pass_along(&mut dist, &mut feat, Axis(ax));
    }

    let distance = ScalarGrid::sharing_space(sites, dist.mapv(|d| d.sqrt() as f32));
    Ok(DistanceField {
        distance,
        nearest: Some(feat),
    })
}

/// 沿 `axis` 对每一条线求下包络.
fn pass_along(dist: &mut Array3<f64>, feat: &mut Array3<Idx3dU16>, axis: Axis) {
    let zip = Zip::from(dist.lanes_mut(axis)).and(feat.lanes_mut(axis));
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            zip.par_for_each(|d, f| {
                let mut buf = LaneBuffer::default();
                buf.transform(d, f);
            });
        } else {
            let mut buf = LaneBuffer::default();
            zip.for_each(|d, f| buf.transform(d, f));
        }
    }
}

/// 一维下包络计算所用的缓存.
#[derive(Default)]
struct LaneBuffer {
    f: Vec<f64>,
    feat: Vec<Idx3dU16>,
    /// 下包络中各抛物线的顶点位置.
    v: Vec<usize>,
    /// 下包络中各抛物线的左边界.
    z: Vec<f64>,
}

impl LaneBuffer {
    fn transform(&mut self, mut d: ArrayViewMut1<f64>, mut ft: ArrayViewMut1<Idx3dU16>) {
        self.f.clear();
        self.f.extend(d.iter().copied());
        self.feat.clear();
        self.feat.extend(ft.iter().copied());
        self.v.clear();
        self.z.clear();

        let f = &self.f;
        let sq = |q: usize| f[q] + (q * q) as f64;
        for q in (0..f.len()).filter(|&q| f[q].is_finite()) {
            let mut s = f64::NEG_INFINITY;
            while let Some(&p) = self.v.last() {
                s = (sq(q) - sq(p)) / (2.0 * (q - p) as f64);
                match self.z.last() {
                    Some(&zl) if s <= zl => {
                        self.v.pop();
                        self.z.pop();
                        s = f64::NEG_INFINITY;
                    }
                    _ => break,
                }
            }
            self.v.push(q);
            self.z.push(s);
        }

        // 整条线都没有有限值, 保持不变.
        if self.v.is_empty() {
            return;
        }

        let mut k = 0;
        for x in 0..f.len() {
            while k + 1 < self.v.len() && self.z[k + 1] < x as f64 {
                k += 1;
            }
            let p = self.v[k];
            let dx = x.abs_diff(p) as f64;
            d[x] = dx * dx + f[p];
            ft[x] = self.feat[p];
        }
    }
}
