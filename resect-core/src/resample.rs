//! 重采样到另一个体素空间.
//!
//! 对目标空间的每个体素, 经 "目标体素 -> 世界 -> 源体素" 的仿射变换找到源坐标再取值.
//! 落在源数据范围外的体素取 0.

use ndarray::Array3;

use crate::data::{apply, Affine};
use crate::morph::fill_indexed;
use crate::{GridSpace, Idx3d, ResectResult, ScalarGrid, VolumeGrid, Voxel};

/// `a * b`.
fn compose(a: &Affine, b: &Affine) -> Affine {
    let mut out = [[0.0; 4]; 4];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = (0..4).map(|k| a[r][k] * b[k][c]).sum();
        }
    }
    out
}

/// 目标体素坐标 -> 源体素坐标.
#[inline]
fn target_to_source(src: &GridSpace, target: &GridSpace) -> ResectResult<Affine> {
    Ok(compose(&src.world_to_voxel()?, target.affine()))
}

fn fill<T, F>(shape: Idx3d, f: F) -> Array3<T>
where
    T: Voxel,
    F: Fn(Idx3d) -> T + Sync + Send,
{
    let mut out = Array3::from_elem(shape, T::zero());
    fill_indexed(&mut out, f);
    out
}

#[inline]
fn to_f64((x, y, z): Idx3d) -> [f64; 3] {
    [x as f64, y as f64, z as f64]
}

/// 最近邻重采样. 不产生新的体素值, 适用于掩膜和分割标签.
pub fn resample_nearest<T: Voxel>(
    grid: &VolumeGrid<T>,
    target: &GridSpace,
) -> ResectResult<VolumeGrid<T>> {
    let m = target_to_source(grid.space(), target)?;
    let (sx, sy, sz) = grid.shape();
    let src = grid.data();
    let data = fill(target.shape(), |pos| {
        let [x, y, z] = apply(&m, to_f64(pos));
        let r = |c: f64, n: usize| {
            let c = (c + 0.5).floor();
            (c >= 0.0 && c < n as f64).then_some(c as usize)
        };
        match (r(x, sx), r(y, sy), r(z, sz)) {
            (Some(x), Some(y), Some(z)) => src[(x, y, z)],
            _ => T::zero(),
        }
    });
    VolumeGrid::new(target.clone(), data)
}

/// 三线性重采样, 适用于强度图像.
pub fn resample_linear(grid: &ScalarGrid, target: &GridSpace) -> ResectResult<ScalarGrid> {
    let m = target_to_source(grid.space(), target)?;
    let (sx, sy, sz) = grid.shape();
    let src = grid.data();
    let data = fill(target.shape(), |pos| {
        let p = apply(&m, to_f64(pos));

        // 每个轴上的两个采样点及权重.
        let mut taps = [[(0usize, 0.0f64); 2]; 3];
        for (a, n) in [sx, sy, sz].into_iter().enumerate() {
            let c = p[a];
            if !(c > -0.5 && c < n as f64 - 0.5) {
                return 0.0;
            }
            let c = c.clamp(0.0, (n - 1) as f64);
            let lo = c.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let t = c - lo as f64;
            taps[a] = [(lo, 1.0 - t), (hi, t)];
        }

        let mut acc = 0.0f64;
        for &(x, wx) in &taps[0] {
            for &(y, wy) in &taps[1] {
                for &(z, wz) in &taps[2] {
                    acc += wx * wy * wz * src[(x, y, z)] as f64;
                }
            }
        }
        acc as f32
    });
    ScalarGrid::new(target.clone(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LabelGrid, Mask};

    #[test]
    fn test_identity_resample_is_noop() {
        let s = GridSpace::with_spacing((4, 5, 6), [1.0, 2.0, 0.5]);
        let labels = LabelGrid::from_fn(s.clone(), |(x, y, z)| (x + 10 * y + 100 * z) as u16);
        assert_eq!(resample_nearest(&labels, &s).unwrap(), labels);

        let g = ScalarGrid::from_fn(s.clone(), |(x, y, z)| (x * y + z) as f32);
        let r = resample_linear(&g, &s).unwrap();
        assert!(r
            .data()
            .iter()
            .zip(g.data().iter())
            .all(|(a, b)| (a - b).abs() < 1e-5));
    }

    #[test]
    fn test_upsample_nearest_preserves_labels() {
        let coarse = GridSpace::with_spacing((4, 4, 4), [2.0, 2.0, 2.0]);
        let fine = GridSpace::identity((8, 8, 8));
        let m = Mask::from_fn(coarse, |(x, y, z)| (x == 1 && y == 1 && z == 1) as u8);
        let up = resample_nearest(&m, &fine).unwrap();
        assert_eq!(up.shape(), (8, 8, 8));
        assert!(up.space().same_as(&fine));
        assert!(up.data().iter().all(|v| *v <= 1));
        // 粗网格体素 1 (世界坐标 2) 覆盖细网格 1, 2.
        assert!(up.is_set((1, 1, 1)));
        assert!(up.is_set((2, 2, 2)));
        assert!(!up.is_set((3, 3, 3)));
        assert_eq!(up.count(), 8);
    }

    #[test]
    fn test_linear_midpoint_and_outside() {
        let src = GridSpace::identity((2, 1, 1));
        let g = ScalarGrid::from_fn(src, |(x, _, _)| if x == 0 { 0.0 } else { 10.0 });
        let mut aff = *GridSpace::identity((1, 1, 1)).affine();
        aff[0][3] = 0.5;
        let mid = resample_linear(&g, &GridSpace::new((1, 1, 1), aff)).unwrap();
        assert!((mid[(0, 0, 0)] - 5.0).abs() < 1e-6);

        aff[0][3] = 5.0;
        let out = resample_linear(&g, &GridSpace::new((1, 1, 1), aff)).unwrap();
        assert_eq!(out[(0, 0, 0)], 0.0);
    }
}
