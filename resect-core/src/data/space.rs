//! 体素空间: 形状 + 体素坐标到世界坐标的仿射矩阵.

use nifti::NiftiHeader;

use crate::{Idx3d, ResectError, ResectResult};

/// 判定两个仿射矩阵相同时, 逐元素允许的误差.
const SPACE_TOLERANCE: f64 = 1e-4;

/// 4x4 仿射矩阵, 行优先.
pub type Affine = [[f64; 4]; 4];

/// 体素空间.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridSpace {
    shape: Idx3d,
    affine: Affine,
}

impl GridSpace {
    /// 由形状和仿射矩阵创建.
    #[inline]
    pub const fn new(shape: Idx3d, affine: Affine) -> Self {
        Self { shape, affine }
    }

    /// 单位仿射矩阵 (1mm 各向同性, 原点在体素 `(0, 0, 0)`).
    #[inline]
    pub fn identity(shape: Idx3d) -> Self {
        Self::with_spacing(shape, [1.0, 1.0, 1.0])
    }

    /// 轴对齐, 体素分辨率为 `spacing` (毫米).
    pub fn with_spacing(shape: Idx3d, [sx, sy, sz]: [f64; 3]) -> Self {
        Self {
            shape,
            affine: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, sz, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// 从 nifti header 读取空间信息. 优先使用 sform (`sform_code > 0`),
    /// 否则按 `pixdim` 构造轴对齐矩阵.
    pub fn from_header(h: &NiftiHeader, shape: Idx3d) -> Self {
        if h.sform_code > 0 {
            let row = |r: &[f32; 4]| r.map(|v| v as f64);
            return Self {
                shape,
                affine: [
                    row(&h.srow_x),
                    row(&h.srow_y),
                    row(&h.srow_z),
                    [0.0, 0.0, 0.0, 1.0],
                ],
            };
        }
        let dim = |v: f32| {
            let v = v.abs() as f64;
            if v > 0.0 {
                v
            } else {
                1.0
            }
        };
        let [_, px, py, pz, ..] = h.pixdim;
        Self::with_spacing(shape, [dim(px), dim(py), dim(pz)])
    }

    /// 将空间信息写入 header (sform, `pixdim`). 不修改 `dim` 与数据类型.
    pub fn write_header(&self, h: &mut NiftiHeader) {
        let [sx, sy, sz] = self.spacing();
        h.pixdim = [1.0, sx as f32, sy as f32, sz as f32, 1.0, 1.0, 1.0, 1.0];
        let row = |r: &[f64; 4]| r.map(|v| v as f32);
        h.srow_x = row(&self.affine[0]);
        h.srow_y = row(&self.affine[1]);
        h.srow_z = row(&self.affine[2]);
        h.sform_code = 1;
        h.qform_code = 0;
        h.scl_slope = 1.0;
        h.scl_inter = 0.0;
    }

    /// 获取形状 `(x, y, z)`.
    #[inline]
    pub const fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 获取仿射矩阵.
    #[inline]
    pub const fn affine(&self) -> &Affine {
        &self.affine
    }

    /// 体素个数.
    #[inline]
    pub const fn len(&self) -> usize {
        self.shape.0 * self.shape.1 * self.shape.2
    }

    /// 是否不含任何体素?
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 检查索引是否合法.
    #[inline]
    pub const fn check(&self, &(x, y, z): &Idx3d) -> bool {
        x < self.shape.0 && y < self.shape.1 && z < self.shape.2
    }

    /// 获取单个体素分辨率 (仿射矩阵前三列的模长), 以毫米为单位.
    pub fn spacing(&self) -> [f64; 3] {
        let a = &self.affine;
        [0, 1, 2].map(|c| (a[0][c] * a[0][c] + a[1][c] * a[1][c] + a[2][c] * a[2][c]).sqrt())
    }

    /// 体数据对角线长度, 以体素为单位.
    #[inline]
    pub fn diagonal(&self) -> f64 {
        let (x, y, z) = self.shape;
        ((x * x + y * y + z * z) as f64).sqrt()
    }

    /// 两个空间是否一致 (形状相同, 仿射矩阵在误差范围内相同)?
    pub fn same_as(&self, other: &Self) -> bool {
        self.shape == other.shape
            && self
                .affine
                .iter()
                .flatten()
                .zip(other.affine.iter().flatten())
                .all(|(a, b)| (a - b).abs() <= SPACE_TOLERANCE)
    }

    /// 同 [`Self::same_as`], 不一致时返回 [`ResectError::SpaceMismatch`].
    #[inline]
    pub fn ensure_same(&self, other: &Self) -> ResectResult<()> {
        if self.same_as(other) {
            Ok(())
        } else {
            Err(ResectError::SpaceMismatch {
                expected: Box::new(self.clone()),
                found: Box::new(other.clone()),
            })
        }
    }

    /// 体素坐标 -> 世界坐标.
    #[inline]
    pub fn voxel_to_world(&self, p: [f64; 3]) -> [f64; 3] {
        apply(&self.affine, p)
    }

    /// 获取世界坐标 -> 体素坐标的仿射矩阵. 若仿射矩阵奇异则返回 `Err`.
    pub fn world_to_voxel(&self) -> ResectResult<Affine> {
        let a = &self.affine;
        let m = |r: usize, c: usize| a[r][c];
        let cof = |r0: usize, r1: usize, c0: usize, c1: usize| {
            m(r0, c0) * m(r1, c1) - m(r0, c1) * m(r1, c0)
        };

        let det =
            m(0, 0) * cof(1, 2, 1, 2) - m(0, 1) * cof(1, 2, 0, 2) + m(0, 2) * cof(1, 2, 0, 1);
        if det.abs() < f64::EPSILON {
            return Err(ResectError::InvalidInput(format!(
                "singular affine matrix {a:?}"
            )));
        }

        // 伴随矩阵 / 行列式.
        let inv = [
            [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
            [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
            [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
        ]
        .map(|r| r.map(|v| v / det));

        let t = [a[0][3], a[1][3], a[2][3]];
        let mut out = [[0.0; 4]; 4];
        for r in 0..3 {
            out[r][..3].copy_from_slice(&inv[r]);
            out[r][3] = -(inv[r][0] * t[0] + inv[r][1] * t[1] + inv[r][2] * t[2]);
        }
        out[3][3] = 1.0;
        Ok(out)
    }
}

/// 对三维点施加仿射变换.
#[inline]
pub fn apply(a: &Affine, [x, y, z]: [f64; 3]) -> [f64; 3] {
    [0, 1, 2].map(|r| a[r][0] * x + a[r][1] * y + a[r][2] * z + a[r][3])
}
