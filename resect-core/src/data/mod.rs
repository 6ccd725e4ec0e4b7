use std::fmt::Debug;
use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayView3, ArrayViewMut3, Axis, Ix3, Zip};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use num::{NumCast, ToPrimitive, Zero};

use crate::{Idx3d, ResectError, ResectResult};

mod space;

pub use space::{apply, Affine, GridSpace};

/// 体素值类型. 目前支持 `u8` (二值掩膜/区域标记), `u16` (分割标签) 和 `f32` (强度).
pub trait Voxel: Copy + PartialEq + Zero + ToPrimitive + Send + Sync + Debug + 'static {
    /// 由 nifti 读出的 `f32` 值转换而来. 整数类型四舍五入并截断到值域内,
    /// `NaN` 被当作 0.
    fn from_f32(v: f32) -> Self;
}

macro_rules! impl_int_voxel {
    ($($t: ty),*) => {
        $(
            impl Voxel for $t {
                #[inline]
                fn from_f32(v: f32) -> Self {
                    let v = v.round().clamp(<$t>::MIN as f32, <$t>::MAX as f32);
                    <$t as NumCast>::from(v).unwrap_or_else(<$t>::zero)
                }
            }
        )*
    };
}

impl_int_voxel!(u8, u16);

impl Voxel for f32 {
    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

/// 带空间信息的 3D 体数据. 体素以 nifti 原生的 `(x, y, z)` 顺序访问,
/// 内部数组始终是标准 (行优先) 布局.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGrid<T> {
    space: GridSpace,
    data: Array3<T>,
}

/// 强度图像.
pub type ScalarGrid = VolumeGrid<f32>;

/// 脑区分割标签图像.
pub type LabelGrid = VolumeGrid<u16>;

/// 二值掩膜, 体素值只会是 0 或 1.
pub type Mask = VolumeGrid<u8>;

impl<T: Voxel> Index<Idx3d> for VolumeGrid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl<T: Voxel> IndexMut<Idx3d> for VolumeGrid<T> {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl<T: Voxel> VolumeGrid<T> {
    /// 由空间信息和数据直接创建. 若数据形状与 `space` 不一致, 则返回 `Err`.
    pub fn new(space: GridSpace, data: Array3<T>) -> ResectResult<Self> {
        if data.dim() != space.shape() {
            return Err(ResectError::InvalidInput(format!(
                "data shape {:?} does not match grid shape {:?}",
                data.dim(),
                space.shape()
            )));
        }
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        debug_assert!(data.is_standard_layout());
        Ok(Self { space, data })
    }

    /// 沿用 `like` 的空间信息包装同形状的数组.
    pub(crate) fn sharing_space<U: Voxel>(like: &VolumeGrid<U>, data: Array3<T>) -> Self {
        debug_assert_eq!(data.dim(), like.shape());
        debug_assert!(data.is_standard_layout());
        Self {
            space: like.space.clone(),
            data,
        }
    }

    /// 创建全 0 体数据.
    #[inline]
    pub fn zeros(space: GridSpace) -> Self {
        Self::filled(space, T::zero())
    }

    /// 创建所有体素均为 `value` 的体数据.
    #[inline]
    pub fn filled(space: GridSpace, value: T) -> Self {
        let data = Array3::from_elem(space.shape(), value);
        Self { space, data }
    }

    /// 按索引逐体素生成数据.
    #[inline]
    pub fn from_fn<F: FnMut(Idx3d) -> T>(space: GridSpace, f: F) -> Self {
        let data = Array3::from_shape_fn(space.shape(), f);
        Self { space, data }
    }

    /// 获取空间信息.
    #[inline]
    pub fn space(&self) -> &GridSpace {
        &self.space
    }

    /// 获取数据形状 `(x, y, z)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.space.shape()
    }

    /// 获取体素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否不含任何体素?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut3<'_, T> {
        self.data.view_mut()
    }

    /// 取出内部数组.
    #[inline]
    pub fn into_data(self) -> Array3<T> {
        self.data
    }

    /// 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx3d) -> Option<&T> {
        self.data.get(pos)
    }

    /// 检查 `other` 是否与自身处于同一体素空间.
    #[inline]
    pub fn ensure_same_space<U: Voxel>(&self, other: &VolumeGrid<U>) -> ResectResult<()> {
        self.space.ensure_same(&other.space)
    }

    /// 逐体素映射为新的体数据, 空间信息不变.
    #[inline]
    pub fn map<U: Voxel, F: Fn(T) -> U>(&self, f: F) -> VolumeGrid<U> {
        VolumeGrid {
            space: self.space.clone(),
            data: self.data.mapv(f),
        }
    }

    /// 与同空间的 `other` 逐体素组合. 若空间不一致, 则返回 `Err`.
    pub fn zip_map<U, V, F>(&self, other: &VolumeGrid<U>, f: F) -> ResectResult<VolumeGrid<V>>
    where
        U: Voxel,
        V: Voxel,
        F: Fn(T, U) -> V,
    {
        self.ensure_same_space(other)?;
        let data = Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|a, b| f(*a, *b));
        Ok(VolumeGrid {
            space: self.space.clone(),
            data,
        })
    }

    /// 满足谓词 `pred` 的体素组成的掩膜.
    #[inline]
    pub fn mask_where<F: Fn(T) -> bool>(&self, pred: F) -> Mask {
        self.map(|v| pred(v) as u8)
    }

    /// 满足谓词 `pred` 的体素个数.
    #[inline]
    pub fn count_where<F: Fn(T) -> bool>(&self, pred: F) -> usize {
        self.data.iter().filter(|v| pred(**v)).count()
    }

    /// 打开 nii / nii.gz 文件. 数据按 `f32` 读入 (已应用 `scl_slope`),
    /// 再转换为 `T`. 末尾长度为 1 的时间维会被去掉.
    pub fn open<P: AsRef<Path>>(path: P) -> ResectResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = obj.header().clone();
        let mut data = obj.into_volume().into_ndarray::<f32>()?;
        while data.ndim() > 3 && data.shape()[data.ndim() - 1] == 1 {
            let last = data.ndim() - 1;
            data = data.index_axis_move(Axis(last), 0);
        }
        let data = data.into_dimensionality::<Ix3>()?;
        let space = GridSpace::from_header(&header, data.dim());
        Self::new(space, data.mapv(T::from_f32))
    }

    /// 保存为 nii / nii.gz 文件 (由扩展名决定是否压缩). 数据统一以 `f32` 写出,
    /// 仿射矩阵写入 sform.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ResectResult<()> {
        let mut header = NiftiHeader::default();
        self.space.write_header(&mut header);
        let data = self.data.mapv(|v| v.to_f32().unwrap_or(0.0));
        WriterOptions::new(path.as_ref())
            .reference_header(&header)
            .write_nifti(&data)?;
        Ok(())
    }
}

impl ScalarGrid {
    /// 获取最小值和最大值. 忽略 `NaN`. 若没有有效体素则返回 `None`.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// 二值掩膜操作.
impl Mask {
    /// 将任意非零值视为前景, 转换为 0/1 掩膜.
    #[inline]
    pub fn binarized(&self) -> Self {
        self.map(|v| (v != 0) as u8)
    }

    /// 该体素是否是前景? 越界时返回 `false`.
    #[inline]
    pub fn is_set(&self, pos: Idx3d) -> bool {
        matches!(self.data.get(pos), Some(&v) if v != 0)
    }

    /// 前景体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v != 0).count()
    }

    /// 是否全为背景?
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|v| *v == 0)
    }

    /// 并集.
    #[inline]
    pub fn union(&self, other: &Mask) -> ResectResult<Mask> {
        self.zip_map(other, |a, b| (a != 0 || b != 0) as u8)
    }

    /// 交集.
    #[inline]
    pub fn intersect(&self, other: &Mask) -> ResectResult<Mask> {
        self.zip_map(other, |a, b| (a != 0 && b != 0) as u8)
    }

    /// 差集 `self - other`.
    #[inline]
    pub fn subtract(&self, other: &Mask) -> ResectResult<Mask> {
        self.zip_map(other, |a, b| (a != 0 && b == 0) as u8)
    }

    /// 补集.
    #[inline]
    pub fn complement(&self) -> Mask {
        self.map(|v| (v == 0) as u8)
    }

    /// 原地并入 `other`.
    pub fn union_assign(&mut self, other: &Mask) -> ResectResult<()> {
        self.ensure_same_space(other)?;
        Zip::from(&mut self.data)
            .and(&other.data)
            .for_each(|a, &b| *a = (*a != 0 || b != 0) as u8);
        Ok(())
    }

    /// 收集所有前景体素的下标. 结果按行优先存储.
    pub fn positions(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, v)| (*v != 0).then_some(pos))
            .collect()
    }

    /// 前景体素的质心 (体素坐标). 全背景时返回 `None`.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        let mut sum = [0.0f64; 3];
        let mut n = 0usize;
        for (x, y, z) in self.positions() {
            sum[0] += x as f64;
            sum[1] += y as f64;
            sum[2] += z as f64;
            n += 1;
        }
        (n != 0).then(|| sum.map(|s| s / n as f64))
    }
}
