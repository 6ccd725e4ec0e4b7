//! 3D 形态学操作与连通域.
//!
//! 膨胀/腐蚀都是半径为 1 的单步操作, 结构元由 [`Connectivity`] 决定.
//! 腐蚀时体数据范围外的体素视为背景.

use std::collections::VecDeque;

use itertools::iproduct;
use ndarray::{Array3, Zip};
use once_cell::sync::Lazy;

use crate::{Idx3d, Idx3dU16, Mask};

pub mod edt;

pub use edt::{distance_transform, DistanceField};

/// &Idx3d -> Idx3dU16
#[inline]
pub(crate) const fn idx3d_to_u16((x, y, z): &Idx3d) -> Idx3dU16 {
    // Usize to uShort
    (*x as u16, *y as u16, *z as u16)
}

/// &Idx3dU16 -> Idx3d
#[inline]
pub(crate) const fn idx3du16_to_usize((x, y, z): &Idx3dU16) -> Idx3d {
    // uShort to Usize
    (*x as usize, *y as usize, *z as usize)
}

type Offset = (isize, isize, isize);

/// 6-邻域 (钻石型) 偏移.
const FACE6: [Offset; 6] = [
    (-1, 0, 0),
    (1, 0, 0),
    (0, -1, 0),
    (0, 1, 0),
    (0, 0, -1),
    (0, 0, 1),
];

/// 26-邻域偏移.
static FULL26: Lazy<Vec<Offset>> = Lazy::new(|| {
    iproduct!(-1isize..=1, -1isize..=1, -1isize..=1)
        .filter(|&o| o != (0, 0, 0))
        .collect()
});

/// 体素邻接方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Connectivity {
    /// 共面邻接, 即 6-邻域.
    #[default]
    Face6,

    /// 共面/共棱/共顶点邻接, 即 26-邻域.
    Full26,
}

impl Connectivity {
    /// 获取全部邻居偏移.
    #[inline]
    pub fn offsets(&self) -> &'static [Offset] {
        match self {
            Self::Face6 => &FACE6,
            Self::Full26 => FULL26.as_slice(),
        }
    }

    /// 获取 `pos` 的全部邻居坐标 (不含自身).
    ///
    /// 在 `shape` 范围外的坐标会被过滤掉, 不会包含在返回值中.
    #[inline]
    pub fn neighbours(&self, shape: Idx3d, pos: Idx3d) -> impl Iterator<Item = Idx3d> {
        self.offsets()
            .iter()
            .filter_map(move |off| shifted(shape, pos, *off))
    }
}

/// `pos + off`. 越界时返回 `None`.
#[inline]
fn shifted((sx, sy, sz): Idx3d, (x, y, z): Idx3d, (dx, dy, dz): Offset) -> Option<Idx3d> {
    let p = (
        x.wrapping_add_signed(dx),
        y.wrapping_add_signed(dy),
        z.wrapping_add_signed(dz),
    );
    (p.0 < sx && p.1 < sy && p.2 < sz).then_some(p)
}

/// 按索引并行 (若启用 `rayon`) 地生成新的体数据.
pub(crate) fn fill_indexed<T, F>(out: &mut Array3<T>, f: F)
where
    T: Send,
    F: Fn(Idx3d) -> T + Sync + Send,
{
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            Zip::indexed(out).par_for_each(|pos, o| *o = f(pos));
        } else {
            Zip::indexed(out).for_each(|pos, o| *o = f(pos));
        }
    }
}

/// 单步膨胀.
pub fn dilate(mask: &Mask, conn: Connectivity) -> Mask {
    let shape = mask.shape();
    let src = mask.data();
    let mut out = Array3::zeros(shape);
    fill_indexed(&mut out, |pos| {
        (src[pos] != 0 || conn.neighbours(shape, pos).any(|p| src[p] != 0)) as u8
    });
    wrap(mask, out)
}

/// 单步腐蚀. 范围外视为背景, 因此贴边的前景体素总会被腐蚀掉.
pub fn erode(mask: &Mask, conn: Connectivity) -> Mask {
    let shape = mask.shape();
    let src = mask.data();
    let n = conn.offsets().len();
    let mut out = Array3::zeros(shape);
    fill_indexed(&mut out, |pos| {
        if src[pos] == 0 {
            return 0;
        }
        let mut inside = 0;
        for p in conn.neighbours(shape, pos) {
            if src[p] == 0 {
                return 0;
            }
            inside += 1;
        }
        (inside == n) as u8
    });
    wrap(mask, out)
}

/// 半径为 `radius` 的闭运算: 先膨胀 `radius` 次, 再腐蚀 `radius` 次.
pub fn close(mask: &Mask, conn: Connectivity, radius: usize) -> Mask {
    let mut out = mask.clone();
    for _ in 0..radius {
        out = dilate(&out, conn);
    }
    for _ in 0..radius {
        out = erode(&out, conn);
    }
    out
}

#[inline]
fn wrap(like: &Mask, data: Array3<u8>) -> Mask {
    Mask::sharing_space(like, data)
}

/// 连通域标记结果.
///
/// 标记值从 1 开始, 0 代表背景. 标记顺序即体素行优先扫描时遇到各连通域的顺序,
/// 因此对同样的输入, 结果总是相同.
#[derive(Debug, Clone)]
pub struct Components {
    labels: Array3<u32>,
    sizes: Vec<usize>,
}

impl Components {
    /// 连通域个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// 是否不存在连通域?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// 每个连通域的体素数, 第 `i` 项对应标记 `i + 1`.
    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// 获取体素所属连通域的标记. 背景为 0.
    #[inline]
    pub fn label_at(&self, pos: Idx3d) -> u32 {
        self.labels[pos]
    }

    /// 体积最大的连通域标记. 体积相同时取标记较小者. 不存在时返回 `None`.
    pub fn largest(&self) -> Option<u32> {
        self.sizes
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, usize)>, (i, &s)| match best {
                Some((_, bs)) if bs >= s => best,
                _ => Some((i, s)),
            })
            .map(|(i, _)| i as u32 + 1)
    }

    /// 所有体积满足 `pred` 的连通域组成的掩膜, 空间信息取自 `like`.
    pub fn mask_where<F: Fn(usize) -> bool>(&self, like: &Mask, pred: F) -> Mask {
        let keep: Vec<bool> = self.sizes.iter().map(|s| pred(*s)).collect();
        let data = self
            .labels
            .mapv(|l| (l != 0 && keep[l as usize - 1]) as u8);
        wrap(like, data)
    }

    /// 标记值为 `label` 的连通域组成的掩膜.
    #[inline]
    pub fn mask_of(&self, like: &Mask, label: u32) -> Mask {
        wrap(like, self.labels.mapv(|l| (l == label && l != 0) as u8))
    }
}

/// 广度优先地标记 `mask` 前景的全部连通域.
pub fn label_components(mask: &Mask, conn: Connectivity) -> Components {
    let shape = mask.shape();
    let src = mask.data();
    let mut labels = Array3::<u32>::zeros(shape);
    let mut sizes = Vec::new();
    let mut q = VecDeque::with_capacity(64);

    for (start, &v) in src.indexed_iter() {
        if v == 0 || labels[start] != 0 {
            continue;
        }
        let cur = sizes.len() as u32 + 1;
        let mut size = 0usize;
        labels[start] = cur;
        q.push_back(start);
        while let Some(pos) = q.pop_front() {
            size += 1;
            for p in conn.neighbours(shape, pos) {
                if src[p] != 0 && labels[p] == 0 {
                    labels[p] = cur;
                    q.push_back(p);
                }
            }
        }
        sizes.push(size);
    }
    Components { labels, sizes }
}

/// 只保留最大连通域. 全背景时返回全背景.
pub fn largest_component(mask: &Mask, conn: Connectivity) -> Mask {
    let comps = label_components(mask, conn);
    match comps.largest() {
        Some(l) => comps.mask_of(mask, l),
        None => Mask::zeros(mask.space().clone()),
    }
}
